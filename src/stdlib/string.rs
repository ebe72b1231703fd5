//! String builtins

use super::{fail, fndef, Args, FnCtx, Registry};
use crate::error::EngineResult;
use crate::udm::{Udm, UdmKind};
use regex::Regex;

pub(crate) fn register(registry: &mut Registry) {
    fndef!(registry, "upper", 1..=1, ["string"], upper);
    fndef!(registry, "lower", 1..=1, ["string"], lower);
    fndef!(registry, "trim", 1..=1, ["string"], trim);
    fndef!(registry, "trimStart", 1..=1, ["string"], trim_start);
    fndef!(registry, "trimEnd", 1..=1, ["string"], trim_end);
    fndef!(registry, "substring", 2..=3, ["string", "start", "end"], substring);
    fndef!(registry, "split", 2..=2, ["string", "separator"], split);
    fndef!(registry, "join", 2..=2, ["array", "separator"], join);
    fndef!(registry, "replace", 3..=3, ["string", "find", "replacement"], replace);
    fndef!(registry, "startsWith", 2..=2, ["string", "prefix"], starts_with);
    fndef!(registry, "endsWith", 2..=2, ["string", "suffix"], ends_with);
    fndef!(registry, "contains", 2..=2, ["string or array", "needle"], contains);
    fndef!(registry, "length", 1..=1, ["string, array or object"], length);
    fndef!(registry, "matches", 2..=2, ["string", "pattern"], matches_fn);
    fndef!(registry, "replaceRegex", 3..=3, ["string", "pattern", "replacement"], replace_regex);
    fndef!(registry, "padLeft", 2..=3, ["string", "width", "pad"], pad_left);
    fndef!(registry, "padRight", 2..=3, ["string", "width", "pad"], pad_right);
    fndef!(registry, "repeat", 2..=2, ["string", "count"], repeat);
    fndef!(registry, "capitalize", 1..=1, ["string"], capitalize);
    fndef!(registry, "camelCase", 1..=1, ["string"], camel_case);
    fndef!(registry, "snakeCase", 1..=1, ["string"], snake_case);
    fndef!(registry, "kebabCase", 1..=1, ["string"], kebab_case);
    fndef!(registry, "titleCase", 1..=1, ["string"], title_case);
}

pub(crate) fn compile_regex(function: &'static str, pattern: &str) -> EngineResult<Regex> {
    Regex::new(pattern).map_err(|e| {
        fail(
            function,
            "a valid regular expression",
            pattern.to_string(),
            e.to_string(),
        )
    })
}

fn upper(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("upper", args);
    Ok(Udm::string(args.next_str()?.to_uppercase()))
}

fn lower(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("lower", args);
    Ok(Udm::string(args.next_str()?.to_lowercase()))
}

fn trim(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("trim", args);
    Ok(Udm::string(args.next_str()?.trim().to_string()))
}

fn trim_start(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("trimStart", args);
    Ok(Udm::string(args.next_str()?.trim_start().to_string()))
}

fn trim_end(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("trimEnd", args);
    Ok(Udm::string(args.next_str()?.trim_end().to_string()))
}

/// Character-based, clamped to the string's bounds; a negative start
/// counts from the end
fn substring(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("substring", args);
    let s = args.next_str()?;
    let start = args.next_int()?;
    let end = match args.opt_next() {
        Some(v) => v.as_int(),
        None => None,
    };
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let clamp = |i: i64| -> usize {
        let i = if i < 0 { len + i } else { i };
        i.clamp(0, len) as usize
    };
    let start = clamp(start);
    let end = clamp(end.unwrap_or(len));
    if start >= end {
        return Ok(Udm::string(""));
    }
    Ok(Udm::string(chars[start..end].iter().collect::<String>()))
}

fn split(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("split", args);
    let s = args.next_str()?;
    let separator = args.next_str()?;
    let parts: Vec<Udm> = if separator.is_empty() {
        s.chars().map(|c| Udm::string(c.to_string())).collect()
    } else {
        s.split(&separator).map(Udm::string).collect()
    };
    Ok(Udm::array(parts))
}

fn join(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("join", args);
    let items = args.next_array()?;
    let separator = args.next_str()?;
    let parts: Vec<String> = items.iter().map(Udm::to_display_string).collect();
    Ok(Udm::string(parts.join(&separator)))
}

fn replace(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("replace", args);
    let s = args.next_str()?;
    let find = args.next_str()?;
    let replacement = args.next_str()?;
    Ok(Udm::string(s.replace(&find, &replacement)))
}

fn starts_with(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("startsWith", args);
    let s = args.next_str()?;
    let prefix = args.next_str()?;
    Ok(Udm::bool(s.starts_with(&prefix)))
}

fn ends_with(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("endsWith", args);
    let s = args.next_str()?;
    let suffix = args.next_str()?;
    Ok(Udm::bool(s.ends_with(&suffix)))
}

/// Substring test on strings, element membership on arrays
fn contains(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("contains", args);
    let haystack = args.next()?;
    let needle = args.next()?;
    match &haystack.kind {
        UdmKind::Str(s) => match &needle.kind {
            UdmKind::Str(sub) => Ok(Udm::bool(s.contains(sub.as_str()))),
            _ => Ok(Udm::bool(s.contains(&needle.to_display_string()))),
        },
        UdmKind::Array(items) => Ok(Udm::bool(items.contains(&needle))),
        _ => Err(fail(
            "contains",
            "a string or array",
            haystack.type_name(),
            "",
        )),
    }
}

fn length(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("length", args);
    let value = args.next()?;
    let n = match &value.kind {
        UdmKind::Str(s) => s.chars().count(),
        UdmKind::Array(items) => items.len(),
        UdmKind::Object(map) => map.len(),
        UdmKind::Binary(bytes) => bytes.len(),
        _ => {
            return Err(fail(
                "length",
                "a string, array, object or binary",
                value.type_name(),
                "",
            ));
        }
    };
    Ok(Udm::int(n as i64))
}

fn matches_fn(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("matches", args);
    let s = args.next_str()?;
    let pattern = args.next_str()?;
    let regex = compile_regex("matches", &pattern)?;
    Ok(Udm::bool(regex.is_match(&s)))
}

fn replace_regex(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("replaceRegex", args);
    let s = args.next_str()?;
    let pattern = args.next_str()?;
    let replacement = args.next_str()?;
    let regex = compile_regex("replaceRegex", &pattern)?;
    Ok(Udm::string(regex.replace_all(&s, replacement.as_str()).into_owned()))
}

fn pad(s: String, width: i64, pad_char: Option<Udm>, left: bool) -> Udm {
    let pad_str = pad_char
        .and_then(|p| p.as_str().map(str::to_string))
        .unwrap_or_else(|| " ".to_string());
    let pad_char = pad_str.chars().next().unwrap_or(' ');
    let current = s.chars().count() as i64;
    if current >= width {
        return Udm::string(s);
    }
    let padding: String = std::iter::repeat(pad_char)
        .take((width - current) as usize)
        .collect();
    if left {
        Udm::string(format!("{}{}", padding, s))
    } else {
        Udm::string(format!("{}{}", s, padding))
    }
}

fn pad_left(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("padLeft", args);
    let s = args.next_str()?;
    let width = args.next_int()?;
    Ok(pad(s, width, args.opt_next(), true))
}

fn pad_right(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("padRight", args);
    let s = args.next_str()?;
    let width = args.next_int()?;
    Ok(pad(s, width, args.opt_next(), false))
}

fn repeat(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("repeat", args);
    let s = args.next_str()?;
    let n = args.next_int()?;
    if n < 0 {
        return Err(fail("repeat", "a non-negative count", n.to_string(), ""));
    }
    Ok(Udm::string(s.repeat(n as usize)))
}

/// Splits an identifier into its word parts across spaces, underscores,
/// hyphens and case transitions
fn words(s: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;
    for c in s.chars() {
        if c == ' ' || c == '_' || c == '-' {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            previous_lower = false;
        } else if c.is_uppercase() && previous_lower {
            out.push(std::mem::take(&mut current));
            current.push(c);
            previous_lower = false;
        } else {
            previous_lower = c.is_lowercase() || c.is_ascii_digit();
            current.push(c);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn capitalize_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn capitalize(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("capitalize", args);
    Ok(Udm::string(capitalize_word(&args.next_str()?)))
}

fn camel_case(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("camelCase", args);
    let parts = words(&args.next_str()?);
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            out.push_str(&part.to_lowercase());
        } else {
            out.push_str(&capitalize_word(part));
        }
    }
    Ok(Udm::string(out))
}

fn snake_case(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("snakeCase", args);
    let parts = words(&args.next_str()?);
    Ok(Udm::string(
        parts
            .iter()
            .map(|p| p.to_lowercase())
            .collect::<Vec<_>>()
            .join("_"),
    ))
}

fn kebab_case(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("kebabCase", args);
    let parts = words(&args.next_str()?);
    Ok(Udm::string(
        parts
            .iter()
            .map(|p| p.to_lowercase())
            .collect::<Vec<_>>()
            .join("-"),
    ))
}

fn title_case(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("titleCase", args);
    let parts = words(&args.next_str()?);
    Ok(Udm::string(
        parts
            .iter()
            .map(|p| capitalize_word(p))
            .collect::<Vec<_>>()
            .join(" "),
    ))
}
