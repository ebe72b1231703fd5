//! Schema-as-data adapters (XSD and JSON Schema, input only)
//!
//! These adapters expose a schema document for navigation rather than
//! validation: the schema root wrapper is unwrapped so its contents are the
//! top-level keys of the result, and the schema dialect is recorded in
//! metadata for introspection through the `__metadata` accessor.

use super::{json, xml, FormatOptions};
use crate::error::{EngineError, EngineResult};
use crate::udm::Udm;

/// Parses an XML Schema document; the `xs:schema` root is unwrapped
pub fn parse_xsd(bytes: &[u8], options: &FormatOptions) -> EngineResult<Udm> {
    let document = xml::parse(bytes, options)?;
    let map = document
        .as_object()
        .expect("xml parse yields a document object");
    let (root_name, root_value) = map.iter().next().ok_or_else(|| {
        EngineError::format_parse("xsd", "schema document has no root element")
    })?;
    let local = root_name.rsplit(':').next().unwrap_or(root_name);
    if local != "schema" {
        return Err(EngineError::format_parse(
            "xsd",
            format!("expected a schema root element, got <{}>", root_name),
        ));
    }
    let mut result = root_value.clone();
    result.metadata_mut().schema_type = Some("xsd".to_string());
    Ok(result)
}

/// Parses a JSON Schema document; the root object is the result
pub fn parse_json_schema(bytes: &[u8], options: &FormatOptions) -> EngineResult<Udm> {
    let mut result = json::parse(bytes, options)?;
    if result.as_object().is_none() {
        return Err(EngineError::format_parse(
            "jsch",
            format!("schema root must be an object, got {}", result.type_name()),
        ));
    }
    result.metadata_mut().schema_type = Some("jsch".to_string());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const XSD: &[u8] = br#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="http://example.com/po">
  <xs:element name="purchaseOrder" type="PurchaseOrderType"/>
  <xs:complexType name="PurchaseOrderType"><xs:sequence/></xs:complexType>
</xs:schema>"#;

    #[test]
    fn xsd_root_is_unwrapped_and_tagged() {
        let udm = parse_xsd(XSD, &FormatOptions::default()).unwrap();
        assert_eq!(udm.metadata().schema_type.as_deref(), Some("xsd"));
        let map = udm.as_object().unwrap();
        assert!(map.contains_key("xs:element"));
        assert!(map.contains_key("xs:complexType"));
        // schema-level attributes survive the unwrap
        assert_eq!(
            udm.attribute("targetNamespace"),
            Some(&Udm::string("http://example.com/po"))
        );
    }

    #[test]
    fn non_schema_root_is_rejected() {
        assert!(parse_xsd(b"<root/>", &FormatOptions::default()).is_err());
    }

    #[test]
    fn json_schema_is_tagged() {
        let udm = parse_json_schema(
            br#"{"$schema":"https://json-schema.org/draft/2020-12/schema","type":"object"}"#,
            &FormatOptions::default(),
        )
        .unwrap();
        assert_eq!(udm.metadata().schema_type.as_deref(), Some("jsch"));
        assert_eq!(
            udm.as_object().unwrap()["type"],
            Udm::string("object")
        );
    }

    #[test]
    fn scalar_json_schema_root_is_rejected() {
        assert!(parse_json_schema(b"42", &FormatOptions::default()).is_err());
    }
}
