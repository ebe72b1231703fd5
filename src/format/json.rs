//! JSON adapter
//!
//! RFC 8259 parsing via `serde_json` with key order preserved. Optional
//! extensions (comments, trailing commas) are handled by a string-aware
//! pre-scan, since `serde_json` itself is strict. Numbers with no
//! fractional part that fit a signed 64-bit integer become Int scalars,
//! everything else becomes Float.
//!
//! Serialisation is minified by default and pretty-printed on request;
//! output is always BOM-free UTF-8. Documented lossy collapse: attribute
//! side-channels have no JSON representation and are dropped on output.

use super::{decode_utf8, ensure_serialisable, strip_bom, FormatOptions};
use crate::error::{EngineError, EngineResult};
use crate::udm::{Udm, UdmKind};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Number, Value};

const FORMAT: &str = "json";

/// Parses JSON bytes into a UDM tree
pub fn parse(bytes: &[u8], options: &FormatOptions) -> EngineResult<Udm> {
    let text = decode_utf8(strip_bom(bytes), FORMAT)?;
    let text = if options.allow_comments || options.allow_trailing_commas {
        std::borrow::Cow::Owned(strip_extensions(
            text,
            options.allow_comments,
            options.allow_trailing_commas,
        ))
    } else {
        std::borrow::Cow::Borrowed(text)
    };
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| EngineError::format_parse(FORMAT, e.to_string()))?;
    Ok(from_json(value))
}

/// Serialises a UDM tree as JSON bytes
pub fn serialise(value: &Udm, options: &FormatOptions) -> EngineResult<Vec<u8>> {
    ensure_serialisable(value, FORMAT)?;
    let mut json = to_json(value)?;
    if options.sort_keys {
        sort_keys(&mut json);
    }
    let bytes = if options.pretty {
        let indent = vec![b' '; options.indent];
        let mut out = Vec::new();
        let formatter = PrettyFormatter::with_indent(&indent);
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        json.serialize(&mut serializer)
            .map_err(|e| EngineError::format_serialise(FORMAT, e.to_string()))?;
        out
    } else {
        serde_json::to_vec(&json)
            .map_err(|e| EngineError::format_serialise(FORMAT, e.to_string()))?
    };
    Ok(bytes)
}

/// serde_json value → UDM
pub(crate) fn from_json(value: Value) -> Udm {
    match value {
        Value::Null => Udm::null(),
        Value::Bool(b) => Udm::bool(b),
        Value::Number(n) => from_number(&n),
        Value::String(s) => Udm::string(s),
        Value::Array(items) => Udm::array(items.into_iter().map(from_json).collect()),
        Value::Object(map) => Udm::object(
            map.into_iter()
                .map(|(key, value)| (key, from_json(value)))
                .collect(),
        ),
    }
}

fn from_number(n: &Number) -> Udm {
    if let Some(i) = n.as_i64() {
        Udm::int(i)
    } else {
        Udm::float(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// UDM → serde_json value; temporal and binary variants render as strings
pub(crate) fn to_json(value: &Udm) -> EngineResult<Value> {
    Ok(match &value.kind {
        UdmKind::Null => Value::Null,
        UdmKind::Bool(b) => Value::Bool(*b),
        UdmKind::Int(i) => Value::Number((*i).into()),
        UdmKind::Float(f) => match Number::from_f64(*f) {
            Some(n) => Value::Number(n),
            None => {
                return Err(EngineError::format_serialise(
                    FORMAT,
                    "non-finite numbers cannot be represented in JSON",
                ));
            }
        },
        UdmKind::Str(s) => Value::String(s.clone()),
        UdmKind::Binary(bytes) => Value::String(BASE64.encode(bytes)),
        UdmKind::Date(_)
        | UdmKind::Time(_)
        | UdmKind::LocalDateTime(_)
        | UdmKind::DateTime(_) => Value::String(value.to_display_string()),
        UdmKind::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(to_json(item)?);
            }
            Value::Array(out)
        }
        UdmKind::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                out.insert(key.clone(), to_json(value)?);
            }
            Value::Object(out)
        }
        UdmKind::Lambda(_) => {
            return Err(EngineError::format_serialise(
                FORMAT,
                "a function value cannot be serialised",
            ));
        }
    })
}

fn sort_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            for (_, child) in entries.iter_mut() {
                sort_keys(child);
            }
            *map = entries.into_iter().collect();
        }
        Value::Array(items) => {
            for item in items {
                sort_keys(item);
            }
        }
        _ => {}
    }
}

/// Removes `//` and `/* */` comments and trailing commas ahead of the
/// strict parser. String literals are honoured; removed regions become
/// spaces so error offsets stay roughly aligned.
fn strip_extensions(text: &str, comments: bool, trailing_commas: bool) -> String {
    let bytes: Vec<char> = text.chars().collect();
    let mut out: Vec<char> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut in_string = false;
    let mut escaped = false;

    while i < bytes.len() {
        let c = bytes[i];
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            '/' if comments && i + 1 < bytes.len() && bytes[i + 1] == '/' => {
                while i < bytes.len() && bytes[i] != '\n' {
                    out.push(' ');
                    i += 1;
                }
            }
            '/' if comments && i + 1 < bytes.len() && bytes[i + 1] == '*' => {
                let mut closed = false;
                while i < bytes.len() {
                    if bytes[i] == '*' && i + 1 < bytes.len() && bytes[i + 1] == '/' {
                        out.push(' ');
                        out.push(' ');
                        i += 2;
                        closed = true;
                        break;
                    }
                    out.push(if bytes[i] == '\n' { '\n' } else { ' ' });
                    i += 1;
                }
                if !closed {
                    break;
                }
            }
            ',' if trailing_commas => {
                // drop the comma when the next significant char closes a scope
                let mut j = i + 1;
                while j < bytes.len() && bytes[j].is_whitespace() {
                    j += 1;
                }
                if j < bytes.len() && (bytes[j] == '}' || bytes[j] == ']') {
                    out.push(' ');
                } else {
                    out.push(',');
                }
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> FormatOptions {
        FormatOptions::default()
    }

    #[test]
    fn parses_preserving_key_order() {
        let udm = parse(br#"{"z":1,"a":2,"m":3}"#, &defaults()).unwrap();
        let keys: Vec<&str> = udm.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn numbers_split_int_and_float() {
        let udm = parse(br#"{"i":7,"f":7.5,"big":9007199254740993}"#, &defaults()).unwrap();
        let map = udm.as_object().unwrap();
        assert_eq!(map["i"], Udm::int(7));
        assert_eq!(map["f"], Udm::float(7.5));
        // 2^53 + 1 still fits i64 and stays integral
        assert_eq!(map["big"], Udm::int(9007199254740993));
    }

    #[test]
    fn round_trip_is_identity_modulo_whitespace() {
        let source = br#"{"items":[{"price":10,"qty":2},{"price":5,"qty":3}],"empty":{},"none":null}"#;
        let udm = parse(source, &defaults()).unwrap();
        let out = serialise(&udm, &defaults()).unwrap();
        assert_eq!(out, source.to_vec());
    }

    #[test]
    fn bom_is_tolerated_and_never_emitted() {
        let udm = parse(b"\xEF\xBB\xBF{\"a\":1}", &defaults()).unwrap();
        let out = serialise(&udm, &defaults()).unwrap();
        assert!(!out.starts_with(&[0xEF, 0xBB, 0xBF]));
        assert_eq!(out, br#"{"a":1}"#.to_vec());
    }

    #[test]
    fn pretty_printing_uses_configured_indent() {
        let udm = parse(br#"{"a":{"b":1}}"#, &defaults()).unwrap();
        let mut options = defaults();
        options.pretty = true;
        options.indent = 4;
        let out = String::from_utf8(serialise(&udm, &options).unwrap()).unwrap();
        assert!(out.contains("\n    \"a\""));
    }

    #[test]
    fn sort_keys_orders_output() {
        let udm = parse(br#"{"b":1,"a":{"d":1,"c":2}}"#, &defaults()).unwrap();
        let mut options = defaults();
        options.sort_keys = true;
        let out = String::from_utf8(serialise(&udm, &options).unwrap()).unwrap();
        assert_eq!(out, r#"{"a":{"c":2,"d":1},"b":1}"#);
    }

    #[test]
    fn comments_and_trailing_commas_behind_options() {
        let source = b"{\n  // comment\n  \"a\": 1, /* block */\n  \"b\": [1, 2,],\n}";
        assert!(parse(source, &defaults()).is_err());
        let mut options = defaults();
        options.allow_comments = true;
        options.allow_trailing_commas = true;
        let udm = parse(source, &options).unwrap();
        assert_eq!(udm.as_object().unwrap()["a"], Udm::int(1));
        assert_eq!(
            udm.as_object().unwrap()["b"],
            Udm::array(vec![Udm::int(1), Udm::int(2)])
        );
    }

    #[test]
    fn lambda_serialisation_is_an_error() {
        use crate::udm::LambdaValue;
        use crate::{ast::Expr, env::Env};
        use smallvec::SmallVec;
        use std::rc::Rc;
        let lambda = Udm::lambda(LambdaValue {
            params: SmallVec::new(),
            body: Rc::new(Expr::Literal(Udm::null())),
            env: Env::new(),
        });
        assert!(matches!(
            serialise(&lambda, &defaults()),
            Err(EngineError::FormatSerialise { .. })
        ));
    }

    #[test]
    fn duplicate_keys_collapse_to_last() {
        let udm = parse(br#"{"a":1,"a":2}"#, &defaults()).unwrap();
        assert_eq!(udm.as_object().unwrap()["a"], Udm::int(2));
    }
}
