//! Array builtins: mapping, filtering, aggregation and set operations
//!
//! Lambdas passed to the iteration functions may declare one parameter
//! (the element) or two (element, index); the extra argument is dropped to
//! fit the lambda's declared arity.

use super::{apply_adaptive, fail, fndef, Args, FnCtx, Registry};
use crate::error::EngineResult;
use crate::udm::{Udm, UdmKind};
use indexmap::IndexMap;
use std::cmp::Ordering;

pub(crate) fn register(registry: &mut Registry) {
    fndef!(registry, "map", 2..=2, ["array", "function"], map);
    fndef!(registry, "filter", 2..=2, ["array", "function"], filter);
    fndef!(registry, "reduce", 2..=3, ["array", "function", "initial"], reduce);
    fndef!(registry, "flatMap", 2..=2, ["array", "function"], flat_map);
    fndef!(registry, "find", 2..=2, ["array", "function"], find);
    fndef!(registry, "findIndex", 2..=2, ["array", "function"], find_index);
    fndef!(registry, "every", 2..=2, ["array", "function"], every);
    fndef!(registry, "some", 2..=2, ["array", "function"], some);
    fndef!(registry, "flatten", 1..=2, ["array", "depth"], flatten);
    fndef!(registry, "reverse", 1..=1, ["array or string"], reverse);
    fndef!(registry, "sort", 1..=1, ["array"], sort);
    fndef!(registry, "sortBy", 2..=2, ["array", "function"], sort_by);
    fndef!(registry, "distinct", 1..=1, ["array"], distinct);
    fndef!(registry, "unique", 1..=1, ["array"], distinct);
    fndef!(registry, "distinctBy", 2..=2, ["array", "function"], distinct_by);
    fndef!(registry, "chunk", 2..=2, ["array", "size"], chunk);
    fndef!(registry, "windowed", 2..=3, ["array", "size", "step"], windowed);
    fndef!(registry, "take", 2..=2, ["array", "count"], take);
    fndef!(registry, "drop", 2..=2, ["array", "count"], drop_fn);
    fndef!(registry, "zip", 2..=2, ["array", "array"], zip);
    fndef!(registry, "unzip", 1..=1, ["array of pairs"], unzip);
    fndef!(registry, "union", 2..=2, ["array", "array"], union);
    fndef!(registry, "intersect", 2..=2, ["array", "array"], intersect);
    fndef!(registry, "difference", 2..=2, ["array", "array"], difference);
    fndef!(registry, "groupBy", 2..=2, ["array", "function"], group_by);
    fndef!(registry, "count", 1..=2, ["array", "function"], count);
    fndef!(registry, "sum", 1..=1, ["array"], sum);
    fndef!(registry, "avg", 1..=1, ["array"], avg);
    fndef!(registry, "min", 1..=1, ["array"], min);
    fndef!(registry, "max", 1..=1, ["array"], max);
    fndef!(registry, "first", 1..=1, ["array"], first);
    fndef!(registry, "last", 1..=1, ["array"], last);
}

/// Total order over values used by sort, min and max: nulls first, then
/// booleans, numbers, strings, temporals, containers by display form
pub(crate) fn cmp_values(a: &Udm, b: &Udm) -> Ordering {
    fn rank(v: &Udm) -> u8 {
        match v.kind {
            UdmKind::Null => 0,
            UdmKind::Bool(_) => 1,
            UdmKind::Int(_) | UdmKind::Float(_) => 2,
            UdmKind::Str(_) => 3,
            UdmKind::Date(_)
            | UdmKind::Time(_)
            | UdmKind::LocalDateTime(_)
            | UdmKind::DateTime(_) => 4,
            _ => 5,
        }
    }
    match (&a.kind, &b.kind) {
        (UdmKind::Bool(x), UdmKind::Bool(y)) => x.cmp(y),
        (UdmKind::Str(x), UdmKind::Str(y)) => x.cmp(y),
        (UdmKind::Date(x), UdmKind::Date(y)) => x.cmp(y),
        (UdmKind::Time(x), UdmKind::Time(y)) => x.cmp(y),
        (UdmKind::LocalDateTime(x), UdmKind::LocalDateTime(y)) => x.cmp(y),
        (UdmKind::DateTime(x), UdmKind::DateTime(y)) => x.cmp(y),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => rank(a)
                .cmp(&rank(b))
                .then_with(|| a.to_display_string().cmp(&b.to_display_string())),
        },
    }
}

fn call_with_index(
    ctx: &mut dyn FnCtx,
    lambda: &crate::udm::LambdaValue,
    item: Udm,
    index: usize,
) -> EngineResult<Udm> {
    apply_adaptive(ctx, lambda, vec![item, Udm::int(index as i64)])
}

fn map(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("map", args);
    let items = args.next_seq()?;
    let lambda = args.next_lambda()?;
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        out.push(call_with_index(ctx, &lambda, item, i)?);
    }
    Ok(Udm::array(out))
}

fn filter(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("filter", args);
    let items = args.next_seq()?;
    let lambda = args.next_lambda()?;
    let mut out = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        if call_with_index(ctx, &lambda, item.clone(), i)?.is_truthy() {
            out.push(item);
        }
    }
    Ok(Udm::array(out))
}

fn reduce(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("reduce", args);
    let items = args.next_array()?;
    let lambda = args.next_lambda()?;
    let initial = args.opt_next();
    let mut iter = items.into_iter();
    let mut acc = match initial {
        Some(value) => value,
        None => match iter.next() {
            Some(value) => value,
            None => return Ok(Udm::null()),
        },
    };
    for item in iter {
        acc = ctx.apply(&lambda, vec![acc, item])?;
    }
    Ok(acc)
}

fn flat_map(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("flatMap", args);
    let items = args.next_seq()?;
    let lambda = args.next_lambda()?;
    let mut out = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        let mapped = call_with_index(ctx, &lambda, item, i)?;
        match mapped.kind {
            UdmKind::Array(inner) => out.extend(inner),
            _ => out.push(mapped),
        }
    }
    Ok(Udm::array(out))
}

fn find(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("find", args);
    let items = args.next_seq()?;
    let lambda = args.next_lambda()?;
    for (i, item) in items.into_iter().enumerate() {
        if call_with_index(ctx, &lambda, item.clone(), i)?.is_truthy() {
            return Ok(item);
        }
    }
    Ok(Udm::null())
}

fn find_index(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("findIndex", args);
    let items = args.next_seq()?;
    let lambda = args.next_lambda()?;
    for (i, item) in items.into_iter().enumerate() {
        if call_with_index(ctx, &lambda, item, i)?.is_truthy() {
            return Ok(Udm::int(i as i64));
        }
    }
    Ok(Udm::int(-1))
}

fn every(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("every", args);
    let items = args.next_seq()?;
    let lambda = args.next_lambda()?;
    for (i, item) in items.into_iter().enumerate() {
        if !call_with_index(ctx, &lambda, item, i)?.is_truthy() {
            return Ok(Udm::bool(false));
        }
    }
    Ok(Udm::bool(true))
}

fn some(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("some", args);
    let items = args.next_seq()?;
    let lambda = args.next_lambda()?;
    for (i, item) in items.into_iter().enumerate() {
        if call_with_index(ctx, &lambda, item, i)?.is_truthy() {
            return Ok(Udm::bool(true));
        }
    }
    Ok(Udm::bool(false))
}

fn flatten(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("flatten", args);
    let items = args.next_array()?;
    let depth = match args.opt_next() {
        Some(v) => v.as_number().map(|n| n as i64).unwrap_or(1),
        None => 1,
    };
    fn go(items: Vec<Udm>, depth: i64, out: &mut Vec<Udm>) {
        for item in items {
            match item.kind {
                UdmKind::Array(inner) if depth > 0 => go(inner, depth - 1, out),
                _ => out.push(item),
            }
        }
    }
    let mut out = Vec::new();
    go(items, depth, &mut out);
    Ok(Udm::array(out))
}

fn reverse(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("reverse", args);
    let value = args.next()?;
    match value.kind {
        UdmKind::Array(mut items) => {
            items.reverse();
            Ok(Udm::array(items))
        }
        UdmKind::Str(s) => Ok(Udm::string(s.chars().rev().collect::<String>())),
        _ => Err(fail(
            "reverse",
            "an array or string",
            value.type_name(),
            "reverse works on sequences",
        )),
    }
}

fn sort(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("sort", args);
    let mut items = args.next_array()?;
    items.sort_by(cmp_values);
    Ok(Udm::array(items))
}

fn sort_by(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("sortBy", args);
    let items = args.next_seq()?;
    let lambda = args.next_lambda()?;
    let mut keyed = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let key = call_with_index(ctx, &lambda, item.clone(), i)?;
        keyed.push((key, item));
    }
    keyed.sort_by(|(a, _), (b, _)| cmp_values(a, b));
    Ok(Udm::array(keyed.into_iter().map(|(_, item)| item).collect()))
}

fn distinct(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("distinct", args);
    let items = args.next_array()?;
    let mut out: Vec<Udm> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    Ok(Udm::array(out))
}

fn distinct_by(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("distinctBy", args);
    let items = args.next_seq()?;
    let lambda = args.next_lambda()?;
    let mut seen: Vec<Udm> = Vec::new();
    let mut out = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        let key = call_with_index(ctx, &lambda, item.clone(), i)?;
        if !seen.contains(&key) {
            seen.push(key);
            out.push(item);
        }
    }
    Ok(Udm::array(out))
}

fn chunk(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("chunk", args);
    let items = args.next_array()?;
    let size = args.next_int()?;
    if size <= 0 {
        return Err(fail("chunk", "a positive size", size.to_string(), ""));
    }
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(size as usize);
    for item in items {
        current.push(item);
        if current.len() == size as usize {
            out.push(Udm::array(std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        out.push(Udm::array(current));
    }
    Ok(Udm::array(out))
}

fn windowed(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("windowed", args);
    let items = args.next_array()?;
    let size = args.next_int()?;
    let step = match args.opt_next() {
        Some(v) => v.as_int().unwrap_or(1),
        None => 1,
    };
    if size <= 0 || step <= 0 {
        return Err(fail(
            "windowed",
            "positive size and step",
            format!("size {}, step {}", size, step),
            "",
        ));
    }
    let (size, step) = (size as usize, step as usize);
    let mut out = Vec::new();
    let mut start = 0;
    while start + size <= items.len() {
        out.push(Udm::array(items[start..start + size].to_vec()));
        start += step;
    }
    Ok(Udm::array(out))
}

fn take(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("take", args);
    let items = args.next_array()?;
    let n = args.next_int()?.max(0) as usize;
    Ok(Udm::array(items.into_iter().take(n).collect()))
}

fn drop_fn(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("drop", args);
    let items = args.next_array()?;
    let n = args.next_int()?.max(0) as usize;
    Ok(Udm::array(items.into_iter().skip(n).collect()))
}

fn zip(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("zip", args);
    let left = args.next_array()?;
    let right = args.next_array()?;
    Ok(Udm::array(
        left.into_iter()
            .zip(right)
            .map(|(a, b)| Udm::array(vec![a, b]))
            .collect(),
    ))
}

fn unzip(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("unzip", args);
    let pairs = args.next_array()?;
    let mut firsts = Vec::with_capacity(pairs.len());
    let mut seconds = Vec::with_capacity(pairs.len());
    for pair in pairs {
        match pair.kind {
            UdmKind::Array(mut items) if items.len() == 2 => {
                seconds.push(items.pop().expect("pair"));
                firsts.push(items.pop().expect("pair"));
            }
            _ => {
                return Err(fail(
                    "unzip",
                    "an array of [a, b] pairs",
                    pair.type_name(),
                    "every element must be a two-element array",
                ));
            }
        }
    }
    Ok(Udm::array(vec![Udm::array(firsts), Udm::array(seconds)]))
}

fn union(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("union", args);
    let left = args.next_array()?;
    let right = args.next_array()?;
    let mut out: Vec<Udm> = Vec::new();
    for item in left.into_iter().chain(right) {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    Ok(Udm::array(out))
}

fn intersect(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("intersect", args);
    let left = args.next_array()?;
    let right = args.next_array()?;
    let mut out: Vec<Udm> = Vec::new();
    for item in left {
        if right.contains(&item) && !out.contains(&item) {
            out.push(item);
        }
    }
    Ok(Udm::array(out))
}

fn difference(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("difference", args);
    let left = args.next_array()?;
    let right = args.next_array()?;
    Ok(Udm::array(
        left.into_iter().filter(|item| !right.contains(item)).collect(),
    ))
}

fn group_by(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("groupBy", args);
    let items = args.next_seq()?;
    let lambda = args.next_lambda()?;
    let mut groups: IndexMap<String, Vec<Udm>> = IndexMap::new();
    for (i, item) in items.into_iter().enumerate() {
        let key = call_with_index(ctx, &lambda, item.clone(), i)?.to_display_string();
        groups.entry(key).or_default().push(item);
    }
    Ok(Udm::object(
        groups
            .into_iter()
            .map(|(key, group)| (key, Udm::array(group)))
            .collect(),
    ))
}

fn count(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("count", args);
    let items = args.next_seq()?;
    match args.opt_next() {
        None => Ok(Udm::int(items.len() as i64)),
        Some(value) => match &value.kind {
            UdmKind::Lambda(lambda) => {
                let lambda = lambda.clone();
                let mut n = 0i64;
                for (i, item) in items.into_iter().enumerate() {
                    if call_with_index(ctx, &lambda, item, i)?.is_truthy() {
                        n += 1;
                    }
                }
                Ok(Udm::int(n))
            }
            _ => Err(fail(
                "count",
                "a function",
                value.type_name(),
                "the optional second argument is a predicate",
            )),
        },
    }
}

fn numeric_items(function: &'static str, items: &[Udm]) -> EngineResult<Vec<f64>> {
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

fn sum(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("sum", args);
    let items = args.next_array()?;
    if items.iter().all(|i| matches!(i.kind, UdmKind::Int(_))) {
        let mut total = 0i64;
        for item in &items {
            match item.kind {
                UdmKind::Int(i) => match total.checked_add(i) {
                    Some(t) => total = t,
                    None => {
                        let numbers = numeric_items("sum", &items)?;
                        return Ok(Udm::float(numbers.iter().sum()));
                    }
                },
                _ => unreachable!(),
            }
        }
        return Ok(Udm::int(total));
    }
    let numbers = numeric_items("sum", &items)?;
    Ok(Udm::float(numbers.iter().sum()))
}

fn avg(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("avg", args);
    let items = args.next_array()?;
    if items.is_empty() {
        return Ok(Udm::null());
    }
    let numbers = numeric_items("avg", &items)?;
    Ok(Udm::float(numbers.iter().sum::<f64>() / numbers.len() as f64))
}

fn min(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("min", args);
    let items = args.next_array()?;
    Ok(items
        .into_iter()
        .min_by(cmp_values)
        .unwrap_or_else(Udm::null))
}

fn max(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("max", args);
    let items = args.next_array()?;
    Ok(items
        .into_iter()
        .max_by(cmp_values)
        .unwrap_or_else(Udm::null))
}

fn first(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("first", args);
    let mut items = args.next_array()?;
    if items.is_empty() {
        Ok(Udm::null())
    } else {
        Ok(items.swap_remove(0))
    }
}

fn last(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("last", args);
    let mut items = args.next_array()?;
    Ok(items.pop().unwrap_or_else(Udm::null))
}
