//! Type inspection and coercion builtins
//!
//! Coercion rules: `toNumber` fails loudly on unconvertible input while
//! `parseNumber` returns null; `toBoolean` accepts booleans, the literal
//! strings "true"/"false", and numbers by zero-ness.

use super::{fail, fndef, Args, FnCtx, Registry};
use crate::error::EngineResult;
use crate::udm::{Udm, UdmKind};

pub(crate) fn register(registry: &mut Registry) {
    fndef!(registry, "getType", 1..=1, ["value"], get_type);
    fndef!(registry, "isString", 1..=1, ["value"], is_string);
    fndef!(registry, "isNumber", 1..=1, ["value"], is_number);
    fndef!(registry, "isBoolean", 1..=1, ["value"], is_boolean);
    fndef!(registry, "isArray", 1..=1, ["value"], is_array);
    fndef!(registry, "isObject", 1..=1, ["value"], is_object);
    fndef!(registry, "isNull", 1..=1, ["value"], is_null);
    fndef!(registry, "isDefined", 1..=1, ["value"], is_defined);
    fndef!(registry, "toString", 1..=1, ["value"], to_string);
    fndef!(registry, "toNumber", 1..=1, ["value"], to_number);
    fndef!(registry, "toBoolean", 1..=1, ["value"], to_boolean);
    fndef!(registry, "parseNumber", 1..=1, ["string"], parse_number);
}

fn get_type(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("getType", args);
    Ok(Udm::string(args.next()?.type_name()))
}

macro_rules! predicate {
    ($fn_name:ident, $pattern:pat) => {
        fn $fn_name(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
            let mut args = Args::new(stringify!($fn_name), args);
            let value = args.next()?;
            Ok(Udm::bool(matches!(value.kind, $pattern)))
        }
    };
}

predicate!(is_string, UdmKind::Str(_));
predicate!(is_number, UdmKind::Int(_) | UdmKind::Float(_));
predicate!(is_boolean, UdmKind::Bool(_));
predicate!(is_array, UdmKind::Array(_));
predicate!(is_object, UdmKind::Object(_));
predicate!(is_null, UdmKind::Null);

fn is_defined(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("isDefined", args);
    Ok(Udm::bool(!args.next()?.is_null()))
}

fn to_string(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("toString", args);
    Ok(Udm::string(args.next()?.to_display_string()))
}

fn numeric_from_str(s: &str) -> Option<Udm> {
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Udm::int(i));
    }
    trimmed.parse::<f64>().ok().map(Udm::float)
}

fn to_number(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("toNumber", args);
    let value = args.next()?;
    match &value.kind {
        UdmKind::Int(_) | UdmKind::Float(_) => Ok(value),
        UdmKind::Bool(b) => Ok(Udm::int(i64::from(*b))),
        UdmKind::Str(s) => numeric_from_str(s).ok_or_else(|| {
            fail(
                "toNumber",
                "a numeric string",
                format!("{:?}", s),
                "use parseNumber for a null-on-failure variant",
            )
        }),
        _ => Err(fail("toNumber", "a number, boolean or numeric string", value.type_name(), "")),
    }
}

fn parse_number(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("parseNumber", args);
    let value = args.next()?;
    match &value.kind {
        UdmKind::Int(_) | UdmKind::Float(_) => Ok(value),
        UdmKind::Str(s) => Ok(numeric_from_str(s).unwrap_or_else(Udm::null)),
        _ => Ok(Udm::null()),
    }
}

fn to_boolean(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("toBoolean", args);
    let value = args.next()?;
    match &value.kind {
        UdmKind::Bool(_) => Ok(value),
        UdmKind::Str(s) if s.eq_ignore_ascii_case("true") => Ok(Udm::bool(true)),
        UdmKind::Str(s) if s.eq_ignore_ascii_case("false") => Ok(Udm::bool(false)),
        UdmKind::Int(i) => Ok(Udm::bool(*i != 0)),
        UdmKind::Float(f) => Ok(Udm::bool(*f != 0.0)),
        _ => Err(fail(
            "toBoolean",
            "a boolean, number or 'true'/'false' string",
            value.type_name(),
            "",
        )),
    }
}
