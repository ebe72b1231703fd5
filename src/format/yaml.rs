//! YAML adapter
//!
//! YAML 1.2 scalar and collection subset via `serde_yaml`. Anchors and
//! aliases are resolved during parsing and not preserved in output.
//! Serialisation uses block style by default; with `flowStyle` the adapter
//! emits JSON-compatible flow collections, which YAML 1.2 accepts verbatim.

use super::{decode_utf8, ensure_serialisable, strip_bom, FormatOptions};
use crate::error::{EngineError, EngineResult};
use crate::udm::{Udm, UdmKind};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_yaml::{Mapping, Number, Value};

const FORMAT: &str = "yaml";

/// Parses YAML bytes into a UDM tree
pub fn parse(bytes: &[u8], _options: &FormatOptions) -> EngineResult<Udm> {
    let text = decode_utf8(strip_bom(bytes), FORMAT)?;
    let value: Value =
        serde_yaml::from_str(text).map_err(|e| EngineError::format_parse(FORMAT, e.to_string()))?;
    from_yaml(value)
}

/// Serialises a UDM tree as YAML bytes
pub fn serialise(value: &Udm, options: &FormatOptions) -> EngineResult<Vec<u8>> {
    ensure_serialisable(value, FORMAT)?;
    if options.flow_style {
        // JSON is valid YAML flow syntax
        return super::json::serialise(value, &FormatOptions::default());
    }
    let yaml = to_yaml(value)?;
    serde_yaml::to_string(&yaml)
        .map(String::into_bytes)
        .map_err(|e| EngineError::format_serialise(FORMAT, e.to_string()))
}

fn from_yaml(value: Value) -> EngineResult<Udm> {
    Ok(match value {
        Value::Null => Udm::null(),
        Value::Bool(b) => Udm::bool(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Udm::int(i)
            } else {
                Udm::float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Udm::string(s),
        Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(from_yaml(item)?);
            }
            Udm::array(out)
        }
        Value::Mapping(map) => {
            let mut out = indexmap::IndexMap::with_capacity(map.len());
            for (key, value) in map {
                let key = match key {
                    Value::String(s) => s,
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    other => {
                        return Err(EngineError::format_parse(
                            FORMAT,
                            format!("unsupported mapping key: {:?}", other),
                        ));
                    }
                };
                out.insert(key, from_yaml(value)?);
            }
            Udm::object(out)
        }
        Value::Tagged(tagged) => from_yaml(tagged.value)?,
    })
}

fn to_yaml(value: &Udm) -> EngineResult<Value> {
    Ok(match &value.kind {
        UdmKind::Null => Value::Null,
        UdmKind::Bool(b) => Value::Bool(*b),
        UdmKind::Int(i) => Value::Number(Number::from(*i)),
        UdmKind::Float(f) => Value::Number(Number::from(*f)),
        UdmKind::Str(s) => Value::String(s.clone()),
        UdmKind::Binary(bytes) => Value::String(BASE64.encode(bytes)),
        UdmKind::Date(_)
        | UdmKind::Time(_)
        | UdmKind::LocalDateTime(_)
        | UdmKind::DateTime(_) => Value::String(value.to_display_string()),
        UdmKind::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(to_yaml(item)?);
            }
            Value::Sequence(out)
        }
        UdmKind::Object(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (key, value) in map {
                out.insert(Value::String(key.clone()), to_yaml(value)?);
            }
            Value::Mapping(out)
        }
        UdmKind::Lambda(_) => {
            return Err(EngineError::format_serialise(
                FORMAT,
                "a function value cannot be serialised",
            ));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> FormatOptions {
        FormatOptions::default()
    }

    #[test]
    fn parses_block_structure_preserving_order() {
        let udm = parse(b"z: 1\na:\n  - x\n  - y\n", &defaults()).unwrap();
        let map = udm.as_object().unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(
            map["a"],
            Udm::array(vec![Udm::string("x"), Udm::string("y")])
        );
    }

    #[test]
    fn anchors_and_aliases_are_resolved() {
        let udm = parse(b"base: &b\n  k: 1\ncopy: *b\n", &defaults()).unwrap();
        let map = udm.as_object().unwrap();
        assert_eq!(map["copy"], map["base"]);
        // the alias is gone from the serialised output
        let out = String::from_utf8(serialise(&udm, &defaults()).unwrap()).unwrap();
        assert!(!out.contains('*'));
    }

    #[test]
    fn structure_round_trips() {
        let udm = parse(b"a: 1\nb:\n  c: text\n  d: 2.5\n", &defaults()).unwrap();
        let out = serialise(&udm, &defaults()).unwrap();
        let again = parse(&out, &defaults()).unwrap();
        assert_eq!(udm, again);
    }

    #[test]
    fn flow_style_emits_flow_collections() {
        let udm = parse(b"a: [1, 2]\n", &defaults()).unwrap();
        let mut options = defaults();
        options.flow_style = true;
        let out = String::from_utf8(serialise(&udm, &options).unwrap()).unwrap();
        assert_eq!(out, r#"{"a":[1,2]}"#);
    }

    #[test]
    fn bom_is_tolerated() {
        let udm = parse(b"\xEF\xBB\xBFa: 1\n", &defaults()).unwrap();
        assert_eq!(udm.as_object().unwrap()["a"], Udm::int(1));
    }
}
