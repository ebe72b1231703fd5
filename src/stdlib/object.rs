//! Object builtins: key/value access, merging, entry transforms and paths
//!
//! Dynamic keys are built through `fromEntries`/`mapEntries` rather than
//! computed-key literal syntax. Entry lambdas receive `(key, value)` — or
//! just the leading arguments their declared arity asks for.

use super::{apply_adaptive, fail, fndef, Args, FnCtx, Registry};
use crate::error::EngineResult;
use crate::udm::{Udm, UdmKind, UdmObject};
use indexmap::IndexMap;

pub(crate) fn register(registry: &mut Registry) {
    fndef!(registry, "keys", 1..=1, ["object"], keys);
    fndef!(registry, "values", 1..=1, ["object"], values);
    fndef!(registry, "entries", 1..=1, ["object"], entries);
    fndef!(registry, "fromEntries", 1..=1, ["array of [key, value]"], from_entries);
    fndef!(registry, "merge", 2..=usize::MAX, ["object", "object"], merge);
    fndef!(registry, "deepMerge", 2..=2, ["object", "object"], deep_merge);
    fndef!(registry, "pick", 2..=2, ["object", "keys"], pick);
    fndef!(registry, "omit", 2..=2, ["object", "keys"], omit);
    fndef!(registry, "mapKeys", 2..=2, ["object", "function"], map_keys);
    fndef!(registry, "mapValues", 2..=2, ["object", "function"], map_values);
    fndef!(registry, "mapEntries", 2..=2, ["object", "function"], map_entries);
    fndef!(registry, "filterEntries", 2..=2, ["object", "function"], filter_entries);
    fndef!(registry, "reduceEntries", 3..=3, ["object", "function", "initial"], reduce_entries);
    fndef!(registry, "someEntry", 2..=2, ["object", "function"], some_entry);
    fndef!(registry, "everyEntry", 2..=2, ["object", "function"], every_entry);
    fndef!(registry, "countEntries", 1..=2, ["object", "function"], count_entries);
    fndef!(registry, "containsKey", 2..=2, ["object", "key"], contains_key);
    fndef!(registry, "getPath", 2..=3, ["value", "path", "default"], get_path);
    fndef!(registry, "setPath", 3..=3, ["value", "path", "new value"], set_path);
}

fn keys(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("keys", args);
    let map = args.next_object()?;
    Ok(Udm::array(map.into_keys().map(Udm::string).collect()))
}

fn values(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("values", args);
    let map = args.next_object()?;
    Ok(Udm::array(map.into_values().collect()))
}

/// Each entry becomes a `[key, value]` pair, the shape `fromEntries` takes
fn entries(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("entries", args);
    let map = args.next_object()?;
    Ok(Udm::array(
        map.into_iter()
            .map(|(key, value)| Udm::array(vec![Udm::string(key), value]))
            .collect(),
    ))
}

/// Accepts `[key, value]` pairs or `{key, value}` objects
fn from_entries(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("fromEntries", args);
    let items = args.next_array()?;
    let mut map: UdmObject = IndexMap::with_capacity(items.len());
    for item in items {
        match item.kind {
            UdmKind::Array(mut pair) if pair.len() == 2 => {
                let value = pair.pop().expect("pair");
                let key = pair.pop().expect("pair");
                map.insert(key.to_display_string(), value);
            }
            UdmKind::Object(mut entry) => {
                let key = entry.shift_remove("key");
                let value = entry.shift_remove("value");
                match (key, value) {
                    (Some(key), Some(value)) => {
                        map.insert(key.to_display_string(), value);
                    }
                    _ => {
                        return Err(fail(
                            "fromEntries",
                            "entries with 'key' and 'value'",
                            "an object without them",
                            "use [key, value] pairs or {key, value} objects",
                        ));
                    }
                }
            }
            _ => {
                return Err(fail(
                    "fromEntries",
                    "an array of [key, value] pairs",
                    item.type_name(),
                    "",
                ));
            }
        }
    }
    Ok(Udm::object(map))
}

/// Shallow merge: later arguments overwrite, first-seen key positions hold
fn merge(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("merge", args);
    let mut out = args.next_object()?;
    while let Some(value) = args.opt_next() {
        match value.kind {
            UdmKind::Object(map) => {
                for (key, value) in map {
                    out.insert(key, value);
                }
            }
            _ => {
                return Err(fail(
                    "merge",
                    "objects",
                    value.type_name(),
                    "every argument must be an object",
                ));
            }
        }
    }
    Ok(Udm::object(out))
}

fn deep_merge(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("deepMerge", args);
    let left = args.next_object()?;
    let right = args.next_object()?;
    Ok(Udm::object(deep_merge_maps(left, right)))
}

fn deep_merge_maps(mut left: UdmObject, right: UdmObject) -> UdmObject {
    for (key, incoming) in right {
        // IndexMap::insert keeps the existing key position, so the
        // left-hand ordering survives the merge
        match left.get(&key).cloned() {
            Some(existing) => match (existing.kind, incoming.kind) {
                (UdmKind::Object(a), UdmKind::Object(b)) => {
                    left.insert(key, Udm::object(deep_merge_maps(a, b)));
                }
                (_, incoming_kind) => {
                    left.insert(key, incoming_kind.into());
                }
            },
            None => {
                left.insert(key, incoming);
            }
        }
    }
    left
}

fn key_list(function: &'static str, value: Udm) -> EngineResult<Vec<String>> {
    match value.kind {
        UdmKind::Array(items) => Ok(items.iter().map(Udm::to_display_string).collect()),
        UdmKind::Str(s) => Ok(vec![s]),
        _ => Err(fail(
            function,
            "an array of keys or a single key",
            value.type_name(),
            "",
        )),
    }
}

fn pick(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("pick", args);
    let map = args.next_object()?;
    let wanted = key_list("pick", args.next()?)?;
    Ok(Udm::object(
        map.into_iter()
            .filter(|(key, _)| wanted.iter().any(|w| w == key))
            .collect(),
    ))
}

fn omit(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("omit", args);
    let map = args.next_object()?;
    let dropped = key_list("omit", args.next()?)?;
    Ok(Udm::object(
        map.into_iter()
            .filter(|(key, _)| !dropped.iter().any(|d| d == key))
            .collect(),
    ))
}

fn map_keys(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("mapKeys", args);
    let map = args.next_object()?;
    let lambda = args.next_lambda()?;
    let mut out: UdmObject = IndexMap::with_capacity(map.len());
    for (key, value) in map {
        let new_key =
            apply_adaptive(ctx, &lambda, vec![Udm::string(key), value.clone()])?;
        out.insert(new_key.to_display_string(), value);
    }
    Ok(Udm::object(out))
}

fn map_values(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("mapValues", args);
    let map = args.next_object()?;
    let lambda = args.next_lambda()?;
    let mut out: UdmObject = IndexMap::with_capacity(map.len());
    for (key, value) in map {
        let new_value =
            apply_adaptive(ctx, &lambda, vec![value, Udm::string(key.clone())])?;
        out.insert(key, new_value);
    }
    Ok(Udm::object(out))
}

/// The lambda receives `(key, value)` and returns a `{key, value}` object
fn map_entries(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("mapEntries", args);
    let map = args.next_object()?;
    let lambda = args.next_lambda()?;
    let mut out: UdmObject = IndexMap::with_capacity(map.len());
    for (key, value) in map {
        let entry = apply_adaptive(ctx, &lambda, vec![Udm::string(key), value])?;
        match entry.kind {
            UdmKind::Object(mut fields) => {
                let key = fields.shift_remove("key");
                let value = fields.shift_remove("value");
                match (key, value) {
                    (Some(key), Some(value)) => {
                        out.insert(key.to_display_string(), value);
                    }
                    _ => {
                        return Err(fail(
                            "mapEntries",
                            "a {key, value} object from the lambda",
                            "an object without both fields",
                            "return { key: ..., value: ... }",
                        ));
                    }
                }
            }
            _ => {
                return Err(fail(
                    "mapEntries",
                    "a {key, value} object from the lambda",
                    entry.type_name(),
                    "return { key: ..., value: ... }",
                ));
            }
        }
    }
    Ok(Udm::object(out))
}

fn filter_entries(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("filterEntries", args);
    let map = args.next_object()?;
    let lambda = args.next_lambda()?;
    let mut out: UdmObject = IndexMap::new();
    for (key, value) in map {
        let keep = apply_adaptive(
            ctx,
            &lambda,
            vec![Udm::string(key.clone()), value.clone()],
        )?;
        if keep.is_truthy() {
            out.insert(key, value);
        }
    }
    Ok(Udm::object(out))
}

fn reduce_entries(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("reduceEntries", args);
    let map = args.next_object()?;
    let lambda = args.next_lambda()?;
    let mut acc = args.next()?;
    for (key, value) in map {
        acc = ctx.apply(&lambda, vec![acc, Udm::string(key), value])?;
    }
    Ok(acc)
}

fn some_entry(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("someEntry", args);
    let map = args.next_object()?;
    let lambda = args.next_lambda()?;
    for (key, value) in map {
        if apply_adaptive(ctx, &lambda, vec![Udm::string(key), value])?.is_truthy() {
            return Ok(Udm::bool(true));
        }
    }
    Ok(Udm::bool(false))
}

fn every_entry(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("everyEntry", args);
    let map = args.next_object()?;
    let lambda = args.next_lambda()?;
    for (key, value) in map {
        if !apply_adaptive(ctx, &lambda, vec![Udm::string(key), value])?.is_truthy() {
            return Ok(Udm::bool(false));
        }
    }
    Ok(Udm::bool(true))
}

fn count_entries(ctx: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("countEntries", args);
    let map = args.next_object()?;
    match args.opt_next() {
        None => Ok(Udm::int(map.len() as i64)),
        Some(value) => match &value.kind {
            UdmKind::Lambda(lambda) => {
                let lambda = lambda.clone();
                let mut n = 0i64;
                for (key, value) in map {
                    if apply_adaptive(ctx, &lambda, vec![Udm::string(key), value])?
                        .is_truthy()
                    {
                        n += 1;
                    }
                }
                Ok(Udm::int(n))
            }
            _ => Err(fail(
                "countEntries",
                "a function",
                value.type_name(),
                "the optional second argument is a predicate",
            )),
        },
    }
}

fn contains_key(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("containsKey", args);
    let map = args.next_object()?;
    let key = args.next_str()?;
    Ok(Udm::bool(map.contains_key(&key)))
}

/// A path is an array of keys/indices or a dotted string like "a.b.0.c"
fn path_segments(function: &'static str, value: Udm) -> EngineResult<Vec<Udm>> {
    match value.kind {
        UdmKind::Array(items) => Ok(items),
        UdmKind::Str(s) => Ok(s
            .split('.')
            .map(|part| match part.parse::<i64>() {
                Ok(i) => Udm::int(i),
                Err(_) => Udm::string(part),
            })
            .collect()),
        _ => Err(fail(
            function,
            "a path (array or dotted string)",
            value.type_name(),
            "",
        )),
    }
}

fn get_path(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("getPath", args);
    let mut current = args.next()?;
    let path = path_segments("getPath", args.next()?)?;
    let fallback = args.opt_next().unwrap_or_else(Udm::null);
    for segment in path {
        let next = match (&current.kind, &segment.kind) {
            (UdmKind::Object(map), UdmKind::Str(key)) => map.get(key).cloned(),
            (UdmKind::Array(items), UdmKind::Int(i)) if *i >= 0 => {
                items.get(*i as usize).cloned()
            }
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Ok(fallback),
        }
    }
    Ok(current)
}

fn set_path(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("setPath", args);
    let root = args.next()?;
    let path = path_segments("setPath", args.next()?)?;
    let new_value = args.next()?;
    if path.is_empty() {
        return Ok(new_value);
    }
    Ok(set_in(root, &path, new_value))
}

/// Builds a new tree with the leaf replaced; missing intermediate objects
/// are created along the way
fn set_in(current: Udm, path: &[Udm], new_value: Udm) -> Udm {
    let (head, rest) = match path.split_first() {
        Some(split) => split,
        None => return new_value,
    };
    match (&head.kind, current.kind) {
        (UdmKind::Str(key), UdmKind::Object(mut map)) => {
            let child = map.get(key).cloned().unwrap_or_else(Udm::empty_object);
            map.insert(key.clone(), set_in(child, rest, new_value));
            Udm::object(map)
        }
        (UdmKind::Str(key), _) => {
            let mut map: UdmObject = IndexMap::new();
            map.insert(key.clone(), set_in(Udm::empty_object(), rest, new_value));
            Udm::object(map)
        }
        (UdmKind::Int(i), UdmKind::Array(mut items)) => {
            let index = (*i).max(0) as usize;
            while items.len() <= index {
                items.push(Udm::null());
            }
            let child = std::mem::replace(&mut items[index], Udm::null());
            items[index] = set_in(child, rest, new_value);
            Udm::array(items)
        }
        (_, other) => other.into(),
    }
}
