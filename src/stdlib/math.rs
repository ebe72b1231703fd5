//! Math builtins: rounding, powers, logarithms, trigonometry, statistics

use super::{fail, fndef, Args, FnCtx, Registry};
use crate::error::EngineResult;
use crate::udm::{Udm, UdmKind};

pub(crate) fn register(registry: &mut Registry) {
    fndef!(registry, "abs", 1..=1, ["number"], abs);
    fndef!(registry, "round", 1..=2, ["number", "digits"], round);
    fndef!(registry, "ceil", 1..=1, ["number"], ceil);
    fndef!(registry, "floor", 1..=1, ["number"], floor);
    fndef!(registry, "pow", 2..=2, ["base", "exponent"], pow);
    fndef!(registry, "sqrt", 1..=1, ["number"], sqrt);
    fndef!(registry, "log", 1..=2, ["number", "base"], log);
    fndef!(registry, "log2", 1..=1, ["number"], log2);
    fndef!(registry, "log10", 1..=1, ["number"], log10);
    fndef!(registry, "exp", 1..=1, ["number"], exp);
    fndef!(registry, "sin", 1..=1, ["number"], sin);
    fndef!(registry, "cos", 1..=1, ["number"], cos);
    fndef!(registry, "tan", 1..=1, ["number"], tan);
    fndef!(registry, "asin", 1..=1, ["number"], asin);
    fndef!(registry, "acos", 1..=1, ["number"], acos);
    fndef!(registry, "atan", 1..=1, ["number"], atan);
    fndef!(registry, "atan2", 2..=2, ["y", "x"], atan2);
    fndef!(registry, "mean", 1..=1, ["array of numbers"], mean);
    fndef!(registry, "median", 1..=1, ["array of numbers"], median);
    fndef!(registry, "mode", 1..=1, ["array of numbers"], mode);
    fndef!(registry, "stdDev", 1..=1, ["array of numbers"], std_dev);
    fndef!(registry, "variance", 1..=1, ["array of numbers"], variance);
    fndef!(registry, "percentile", 2..=2, ["array of numbers", "percentile"], percentile);
    fndef!(registry, "pi", 0..=0, [], pi);
    fndef!(registry, "e", 0..=0, [], e);
}

fn abs(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("abs", args);
    let value = args.next()?;
    match value.kind {
        UdmKind::Int(i) => Ok(Udm::int(i.abs())),
        UdmKind::Float(f) => Ok(Udm::float(f.abs())),
        _ => Err(fail("abs", "a number", value.type_name(), "")),
    }
}

/// Half-away-from-zero rounding; optional digit count
fn round(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("round", args);
    let n = args.next_number()?;
    match args.opt_next() {
        None => Ok(Udm::int(n.round() as i64)),
        Some(digits) => {
            let digits = digits.as_int().unwrap_or(0);
            let factor = 10f64.powi(digits as i32);
            Ok(Udm::float((n * factor).round() / factor))
        }
    }
}

fn ceil(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("ceil", args);
    Ok(Udm::int(args.next_number()?.ceil() as i64))
}

fn floor(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("floor", args);
    Ok(Udm::int(args.next_number()?.floor() as i64))
}

fn pow(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("pow", args);
    let base = args.next()?;
    let exponent = args.next()?;
    if let (UdmKind::Int(b), UdmKind::Int(e)) = (&base.kind, &exponent.kind) {
        if (0..=u32::MAX as i64).contains(e) {
            if let Some(v) = b.checked_pow(*e as u32) {
                return Ok(Udm::int(v));
            }
        }
    }
    let b = base
        .as_number()
        .ok_or_else(|| fail("pow", "a number", base.type_name(), ""))?;
    let e = exponent
        .as_number()
        .ok_or_else(|| fail("pow", "a number", exponent.type_name(), ""))?;
    Ok(Udm::float(b.powf(e)))
}

fn sqrt(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("sqrt", args);
    Ok(Udm::float(args.next_number()?.sqrt()))
}

fn log(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("log", args);
    let n = args.next_number()?;
    match args.opt_next() {
        None => Ok(Udm::float(n.ln())),
        Some(base) => {
            let base = base
                .as_number()
                .ok_or_else(|| fail("log", "a numeric base", base.type_name(), ""))?;
            Ok(Udm::float(n.log(base)))
        }
    }
}

fn log2(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("log2", args);
    Ok(Udm::float(args.next_number()?.log2()))
}

fn log10(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("log10", args);
    Ok(Udm::float(args.next_number()?.log10()))
}

fn exp(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("exp", args);
    Ok(Udm::float(args.next_number()?.exp()))
}

macro_rules! trig {
    ($name:ident) => {
        fn $name(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
            let mut args = Args::new(stringify!($name), args);
            Ok(Udm::float(args.next_number()?.$name()))
        }
    };
}

trig!(sin);
trig!(cos);
trig!(tan);
trig!(asin);
trig!(acos);
trig!(atan);

fn atan2(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("atan2", args);
    let y = args.next_number()?;
    let x = args.next_number()?;
    Ok(Udm::float(y.atan2(x)))
}

fn numbers(function: &'static str, args: &mut Args) -> EngineResult<Vec<f64>> {
    let items = args.next_array()?;
    items
        .iter()
        .map(|item| {
            item.as_number().ok_or_else(|| {
                fail(
                    function,
                    "an array of numbers",
                    item.type_name(),
                    "every element must be numeric",
                )
            })
        })
        .collect()
}

fn mean(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("mean", args);
    let xs = numbers("mean", &mut args)?;
    if xs.is_empty() {
        return Ok(Udm::null());
    }
    Ok(Udm::float(xs.iter().sum::<f64>() / xs.len() as f64))
}

fn median(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("median", args);
    let mut xs = numbers("median", &mut args)?;
    if xs.is_empty() {
        return Ok(Udm::null());
    }
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = xs.len() / 2;
    if xs.len() % 2 == 1 {
        Ok(Udm::float(xs[mid]))
    } else {
        Ok(Udm::float((xs[mid - 1] + xs[mid]) / 2.0))
    }
}

/// Most frequent value; ties resolve to the first seen
fn mode(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("mode", args);
    let xs = numbers("mode", &mut args)?;
    if xs.is_empty() {
        return Ok(Udm::null());
    }
    let mut best = xs[0];
    let mut best_count = 0usize;
    let mut seen: Vec<f64> = Vec::new();
    for &x in &xs {
        if seen.contains(&x) {
            continue;
        }
        seen.push(x);
        let count = xs.iter().filter(|&&y| y == x).count();
        if count > best_count {
            best = x;
            best_count = count;
        }
    }
    Ok(Udm::float(best))
}

fn population_variance(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    Some(xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64)
}

fn variance(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("variance", args);
    let xs = numbers("variance", &mut args)?;
    Ok(population_variance(&xs).map(Udm::float).unwrap_or_else(Udm::null))
}

fn std_dev(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("stdDev", args);
    let xs = numbers("stdDev", &mut args)?;
    Ok(population_variance(&xs)
        .map(|v| Udm::float(v.sqrt()))
        .unwrap_or_else(Udm::null))
}

/// Nearest-rank percentile with linear interpolation
fn percentile(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("percentile", args);
    let mut xs = numbers("percentile", &mut args)?;
    let p = args.next_number()?;
    if xs.is_empty() {
        return Ok(Udm::null());
    }
    if !(0.0..=100.0).contains(&p) {
        return Err(fail(
            "percentile",
            "a percentile between 0 and 100",
            p.to_string(),
            "",
        ));
    }
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = p / 100.0 * (xs.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        Ok(Udm::float(xs[low]))
    } else {
        let fraction = rank - low as f64;
        Ok(Udm::float(xs[low] + (xs[high] - xs[low]) * fraction))
    }
}

fn pi(_: &mut dyn FnCtx, _: Vec<Udm>) -> EngineResult<Udm> {
    Ok(Udm::float(std::f64::consts::PI))
}

fn e(_: &mut dyn FnCtx, _: Vec<Udm>) -> EngineResult<Udm> {
    Ok(Udm::float(std::f64::consts::E))
}
