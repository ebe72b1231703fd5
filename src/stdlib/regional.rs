//! Regional number parsing and rendering
//!
//! Four grouping/decimal conventions: US (`1,234.56`), EU (`1.234,56`),
//! Swiss (`1'234.56`) and French (`1 234,56`, accepting the no-break and
//! narrow no-break spaces commonly pasted from documents).

use super::{fail, fndef, Args, FnCtx, Registry};
use crate::error::EngineResult;
use crate::udm::Udm;

pub(crate) fn register(registry: &mut Registry) {
    fndef!(registry, "parseRegionalNumber", 2..=2, ["string", "region"], parse_regional);
    fndef!(registry, "formatRegionalNumber", 2..=3, ["number", "region", "decimals"], format_regional);
}

struct Convention {
    grouping: &'static [char],
    decimal: char,
}

fn convention(function: &'static str, region: &str) -> EngineResult<Convention> {
    match region.to_ascii_lowercase().as_str() {
        "us" => Ok(Convention {
            grouping: &[','],
            decimal: '.',
        }),
        "eu" => Ok(Convention {
            grouping: &['.'],
            decimal: ',',
        }),
        "swiss" => Ok(Convention {
            grouping: &['\''],
            decimal: '.',
        }),
        "french" => Ok(Convention {
            grouping: &[' ', '\u{A0}', '\u{202F}'],
            decimal: ',',
        }),
        other => Err(fail(
            function,
            "a region of us, eu, swiss or french",
            other.to_string(),
            "",
        )),
    }
}

fn parse_regional(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("parseRegionalNumber", args);
    let text = args.next_str()?;
    let region = args.next_str()?;
    let convention = convention("parseRegionalNumber", &region)?;
    let mut normalised = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if convention.grouping.contains(&c) {
            continue;
        }
        if c == convention.decimal {
            normalised.push('.');
        } else {
            normalised.push(c);
        }
    }
    if let Ok(i) = normalised.parse::<i64>() {
        return Ok(Udm::int(i));
    }
    normalised
        .parse::<f64>()
        .map(Udm::float)
        .map_err(|_| {
            fail(
                "parseRegionalNumber",
                format!("a {} formatted number", region),
                format!("{:?}", text),
                "",
            )
        })
}

fn format_regional(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("formatRegionalNumber", args);
    let n = args.next_number()?;
    let region = args.next_str()?;
    let decimals = match args.opt_next() {
        Some(value) => value.as_int().unwrap_or(2).clamp(0, 12) as usize,
        None => 2,
    };
    let convention = convention("formatRegionalNumber", &region)?;
    let group_char = convention.grouping[0];

    let rendered = format!("{:.*}", decimals, n.abs());
    let (integer, fraction) = match rendered.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (rendered, None),
    };

    let mut grouped = String::new();
    for (i, c) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(group_char);
        }
        grouped.push(c);
    }

    let mut out = String::new();
    if n < 0.0 {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(fraction) = fraction {
        out.push(convention.decimal);
        out.push_str(&fraction);
    }
    Ok(Udm::string(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdlib::FnCtx;
    use crate::udm::LambdaValue;

    struct NoCtx;
    impl FnCtx for NoCtx {
        fn apply(&mut self, _: &LambdaValue, _: Vec<Udm>) -> EngineResult<Udm> {
            unreachable!()
        }
    }

    fn parse(text: &str, region: &str) -> Udm {
        parse_regional(&mut NoCtx, vec![Udm::string(text), Udm::string(region)]).unwrap()
    }

    #[test]
    fn parses_all_four_conventions() {
        assert_eq!(parse("1,234.56", "us"), Udm::float(1234.56));
        assert_eq!(parse("1.234,56", "eu"), Udm::float(1234.56));
        assert_eq!(parse("1'234.56", "swiss"), Udm::float(1234.56));
        assert_eq!(parse("1 234,56", "french"), Udm::float(1234.56));
        assert_eq!(parse("1\u{202F}234", "french"), Udm::int(1234));
    }

    #[test]
    fn formats_with_grouping() {
        let out = format_regional(
            &mut NoCtx,
            vec![Udm::float(1234567.891), Udm::string("eu")],
        )
        .unwrap();
        assert_eq!(out, Udm::string("1.234.567,89"));
        let out = format_regional(
            &mut NoCtx,
            vec![Udm::int(-1234), Udm::string("us"), Udm::int(0)],
        )
        .unwrap();
        assert_eq!(out, Udm::string("-1,234"));
    }

    #[test]
    fn unknown_region_is_rejected() {
        assert!(
            parse_regional(&mut NoCtx, vec![Udm::string("1"), Udm::string("mars")]).is_err()
        );
    }
}
