//! XML adapter
//!
//! Event-driven parsing and writing over `quick-xml`. The parsed result is
//! a document wrapper object with a single key, the root element. Repeated
//! child element names collapse into an Array under that key; attributes go
//! to the attribute side-channel of the owning element's value; namespace
//! declarations and the declared document encoding are recorded in
//! metadata. Mixed content is represented with synthetic `#text` entries at
//! their document positions.
//!
//! The internal representation is UTF-8 only; the declared source encoding
//! is kept in metadata so serialisation can restate it.

use super::{ensure_serialisable, strip_bom, FormatOptions};
use crate::error::{EngineError, EngineResult};
use crate::udm::{NodeClass, Udm, UdmKind, UdmObject};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use indexmap::IndexMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

const FORMAT: &str = "xml";

/// An element being built while its closing tag is still ahead
struct PendingElement {
    name: String,
    attributes: Vec<(String, String)>,
    namespaces: IndexMap<String, String>,
    /// Ordered children: element name (or synthetic `#text…` key) → value
    children: Vec<(String, Udm)>,
    text_runs: usize,
}

impl PendingElement {
    fn new(name: String) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            namespaces: IndexMap::new(),
            children: Vec::new(),
            text_runs: 0,
        }
    }

    fn push_text(&mut self, text: String) {
        let key = if self.text_runs == 0 {
            "#text".to_string()
        } else {
            format!("#text{}", self.text_runs + 1)
        };
        self.text_runs += 1;
        let mut value = Udm::string(text);
        value.metadata_mut().node_class = Some(NodeClass::Text);
        self.children.push((key, value));
    }

    /// Builds the element's value: scalar for text-only content, `""` for
    /// an empty element, an object otherwise (repeated names auto-array)
    fn finish(self) -> (String, Udm) {
        let mut value = if self.children.is_empty() {
            Udm::string("")
        } else if self.children.len() == 1 && self.text_runs == 1 {
            Udm::string(self.children[0].1.as_str().unwrap_or_default())
        } else {
            let mut grouped: IndexMap<String, Vec<Udm>> = IndexMap::new();
            for (name, child) in self.children {
                grouped.entry(name).or_default().push(child);
            }
            let mut map: UdmObject = IndexMap::new();
            for (name, mut values) in grouped {
                if values.len() == 1 {
                    map.insert(name, values.pop().expect("single value"));
                } else {
                    map.insert(name, Udm::array(values));
                }
            }
            Udm::object(map)
        };
        for (name, attr) in self.attributes {
            value.set_attribute(name, Udm::string(attr));
        }
        if !self.namespaces.is_empty() {
            value.metadata_mut().namespaces = self.namespaces;
        }
        value.metadata_mut().node_class = Some(NodeClass::Element);
        (self.name, value)
    }
}

/// Parses an XML document into a document wrapper object
pub fn parse(bytes: &[u8], _options: &FormatOptions) -> EngineResult<Udm> {
    let text = super::decode_utf8(strip_bom(bytes), FORMAT)?;
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<PendingElement> = Vec::new();
    let mut declared_encoding: Option<String> = None;
    let mut root: Option<(String, Udm)> = None;

    loop {
        let event = reader
            .read_event(&mut buf)
            .map_err(|e| EngineError::format_parse(FORMAT, e.to_string()))?;
        match event {
            Event::Decl(decl) => {
                if let Some(encoding) = decl.encoding() {
                    let encoding =
                        encoding.map_err(|e| EngineError::format_parse(FORMAT, e.to_string()))?;
                    declared_encoding =
                        Some(String::from_utf8_lossy(encoding.as_ref()).to_string());
                }
            }
            Event::Start(start) => {
                let element = read_start(&reader, &start)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = read_start(&reader, &start)?;
                let (name, value) = element.finish();
                attach_child(&mut stack, &mut root, name, value)?;
            }
            Event::Text(text) => {
                let content = text
                    .unescape_and_decode(&reader)
                    .map_err(|e| EngineError::format_parse(FORMAT, e.to_string()))?;
                if !content.is_empty() {
                    if let Some(parent) = stack.last_mut() {
                        parent.push_text(content);
                    }
                }
            }
            Event::CData(data) => {
                let content = std::str::from_utf8(data.clone().into_inner().as_ref())
                    .map_err(|e| EngineError::format_parse(FORMAT, e.to_string()))?
                    .to_string();
                if let Some(parent) = stack.last_mut() {
                    parent.push_text(content);
                }
            }
            Event::End(end) => {
                let element = stack.pop().ok_or_else(|| {
                    EngineError::format_parse(FORMAT, "unexpected closing tag")
                })?;
                let closing = String::from_utf8_lossy(end.name()).to_string();
                if closing != element.name {
                    return Err(EngineError::format_parse(
                        FORMAT,
                        format!(
                            "mismatched closing tag </{}>, expected </{}>",
                            closing, element.name
                        ),
                    ));
                }
                let (name, value) = element.finish();
                attach_child(&mut stack, &mut root, name, value)?;
            }
            Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(EngineError::format_parse(
            FORMAT,
            "premature end of document, unclosed elements remain",
        ));
    }
    let (root_name, root_value) =
        root.ok_or_else(|| EngineError::format_parse(FORMAT, "document has no root element"))?;

    let mut document: UdmObject = IndexMap::new();
    document.insert(root_name, root_value);
    let mut document = Udm::object(document);
    {
        let meta = document.metadata_mut();
        meta.document = true;
        meta.encoding = declared_encoding;
    }
    Ok(document)
}

fn read_start(reader: &Reader<&[u8]>, start: &BytesStart<'_>) -> EngineResult<PendingElement> {
    let name = String::from_utf8_lossy(start.name()).to_string();
    let mut element = PendingElement::new(name);
    for attribute in start.attributes() {
        let attribute =
            attribute.map_err(|e| EngineError::format_parse(FORMAT, e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key).to_string();
        let value = attribute
            .unescape_and_decode_value(reader)
            .map_err(|e| EngineError::format_parse(FORMAT, e.to_string()))?;
        if key == "xmlns" {
            element.namespaces.insert(String::new(), value);
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            element.namespaces.insert(prefix.to_string(), value);
        } else {
            element.attributes.push((key, value));
        }
    }
    Ok(element)
}

fn attach_child(
    stack: &mut Vec<PendingElement>,
    root: &mut Option<(String, Udm)>,
    name: String,
    value: Udm,
) -> EngineResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push((name, value));
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(EngineError::format_parse(
                    FORMAT,
                    "document has more than one root element",
                ));
            }
            *root = Some((name, value));
            Ok(())
        }
    }
}

/// Serialises a UDM tree as an XML document
///
/// The top-level object names the root element; the `encoding` option
/// overrides the metadata-recorded encoding, and the value `"NONE"` emits a
/// declaration without an encoding attribute.
pub fn serialise(value: &Udm, options: &FormatOptions) -> EngineResult<Vec<u8>> {
    ensure_serialisable(value, FORMAT)?;
    let map = value.as_object().ok_or_else(|| {
        EngineError::format_serialise(
            FORMAT,
            format!("top-level value must be an object, got {}", value.type_name()),
        )
    })?;
    if map.len() != 1 {
        return Err(EngineError::format_serialise(
            FORMAT,
            format!(
                "an XML document needs exactly one root element, got {} top-level keys",
                map.len()
            ),
        ));
    }

    let encoding = options
        .encoding
        .clone()
        .or_else(|| value.metadata().encoding.clone())
        .unwrap_or_else(|| "UTF-8".to_string());

    let mut writer = Writer::new(Vec::new());
    let decl = if encoding == "NONE" {
        BytesDecl::new(b"1.0", None, None)
    } else {
        BytesDecl::new(b"1.0", Some(encoding.as_bytes()), None)
    };
    writer
        .write_event(Event::Decl(decl))
        .map_err(|e| EngineError::format_serialise(FORMAT, e.to_string()))?;

    let (root_name, root_value) = map.iter().next().expect("single-entry map");
    if matches!(root_value.kind, UdmKind::Array(_)) {
        return Err(EngineError::format_serialise(
            FORMAT,
            "the root element cannot be an array, a document has one root",
        ));
    }
    write_element(&mut writer, root_name, root_value)?;
    Ok(writer.into_inner())
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Udm) -> EngineResult<()> {
    validate_element_name(name)?;

    // repeated elements: an array under a key emits one element per item
    if let UdmKind::Array(items) = &value.kind {
        for item in items {
            write_element(writer, name, item)?;
        }
        return Ok(());
    }

    let mut start = BytesStart::owned_name(name.as_bytes().to_vec());
    for (prefix, uri) in &value.metadata().namespaces {
        if prefix.is_empty() {
            start.push_attribute(("xmlns", uri.as_str()));
        } else {
            start.push_attribute((format!("xmlns:{}", prefix).as_str(), uri.as_str()));
        }
    }
    for (attr_name, attr_value) in value.attributes() {
        start.push_attribute((attr_name.as_str(), attr_value.to_display_string().as_str()));
    }

    let text = match &value.kind {
        UdmKind::Object(children) => {
            if children.is_empty() {
                writer
                    .write_event(Event::Empty(start))
                    .map_err(|e| EngineError::format_serialise(FORMAT, e.to_string()))?;
                return Ok(());
            }
            writer
                .write_event(Event::Start(start))
                .map_err(|e| EngineError::format_serialise(FORMAT, e.to_string()))?;
            for (child_name, child) in children {
                if child_name.starts_with("#text") {
                    let run = child.to_display_string();
                    writer
                        .write_event(Event::Text(BytesText::from_plain_str(&run)))
                        .map_err(|e| EngineError::format_serialise(FORMAT, e.to_string()))?;
                } else {
                    write_element(writer, child_name, child)?;
                }
            }
            writer
                .write_event(Event::End(BytesEnd::owned(name.as_bytes().to_vec())))
                .map_err(|e| EngineError::format_serialise(FORMAT, e.to_string()))?;
            return Ok(());
        }
        UdmKind::Null => String::new(),
        UdmKind::Str(s) => s.clone(),
        UdmKind::Binary(bytes) => BASE64.encode(bytes),
        _ => value.to_display_string(),
    };

    if text.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| EngineError::format_serialise(FORMAT, e.to_string()))?;
    } else {
        writer
            .write_event(Event::Start(start))
            .map_err(|e| EngineError::format_serialise(FORMAT, e.to_string()))?;
        writer
            .write_event(Event::Text(BytesText::from_plain_str(&text)))
            .map_err(|e| EngineError::format_serialise(FORMAT, e.to_string()))?;
        writer
            .write_event(Event::End(BytesEnd::owned(name.as_bytes().to_vec())))
            .map_err(|e| EngineError::format_serialise(FORMAT, e.to_string()))?;
    }
    Ok(())
}

/// Element names must be valid XML names (no spaces, not digit-initial)
fn validate_element_name(name: &str) -> EngineResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(EngineError::format_serialise(
            FORMAT,
            format!("'{}' is not a valid XML element name", name),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> FormatOptions {
        FormatOptions::default()
    }

    fn parse_str(xml: &str) -> Udm {
        parse(xml.as_bytes(), &defaults()).unwrap()
    }

    #[test]
    fn parses_root_attributes_and_children() {
        let doc = parse_str(r#"<Order id="1"><Name>A</Name></Order>"#);
        assert!(doc.metadata().document);
        let order = &doc.as_object().unwrap()["Order"];
        assert_eq!(order.attribute("id"), Some(&Udm::string("1")));
        assert_eq!(order.as_object().unwrap()["Name"], Udm::string("A"));
    }

    #[test]
    fn repeated_element_names_become_an_array() {
        let doc = parse_str("<Items><Item>1</Item><Item>2</Item><Other>x</Other></Items>");
        let items = &doc.as_object().unwrap()["Items"];
        let map = items.as_object().unwrap();
        assert_eq!(
            map["Item"],
            Udm::array(vec![Udm::string("1"), Udm::string("2")])
        );
        assert_eq!(map["Other"], Udm::string("x"));
    }

    #[test]
    fn round_trips_structure_and_attributes() {
        let source = r#"<?xml version="1.0" encoding="UTF-8"?><Order id="1"><Name>A</Name></Order>"#;
        let doc = parse_str(source);
        let out = serialise(&doc, &defaults()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), source);
    }

    #[test]
    fn encoding_none_suppresses_the_attribute() {
        let doc = parse_str("<a>1</a>");
        let mut options = defaults();
        options.encoding = Some("NONE".to_string());
        let out = String::from_utf8(serialise(&doc, &options).unwrap()).unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\"?>"));
    }

    #[test]
    fn declared_encoding_is_recorded_in_metadata() {
        let doc = parse_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?><a>x</a>");
        assert_eq!(doc.metadata().encoding.as_deref(), Some("UTF-8"));
    }

    #[test]
    fn namespaces_are_stored_in_metadata_and_re_emitted() {
        let source = r#"<?xml version="1.0" encoding="UTF-8"?><root xmlns:po="http://example.com/po"><po:Id>1</po:Id></root>"#;
        let doc = parse_str(source);
        let root = &doc.as_object().unwrap()["root"];
        assert_eq!(
            root.metadata().namespaces.get("po").map(String::as_str),
            Some("http://example.com/po")
        );
        let out = String::from_utf8(serialise(&doc, &defaults()).unwrap()).unwrap();
        assert_eq!(out, source);
    }

    #[test]
    fn mixed_content_keeps_text_positions() {
        let doc = parse_str("<p>before<b>bold</b>after</p>");
        let p = &doc.as_object().unwrap()["p"];
        let keys: Vec<&str> = p.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["#text", "b", "#text2"]);
    }

    #[test]
    fn multi_key_top_level_object_is_rejected() {
        let mut map = IndexMap::new();
        map.insert("a".to_string(), Udm::int(1));
        map.insert("b".to_string(), Udm::int(2));
        assert!(matches!(
            serialise(&Udm::object(map), &defaults()),
            Err(EngineError::FormatSerialise { .. })
        ));
    }

    #[test]
    fn invalid_element_names_are_rejected() {
        let mut map = IndexMap::new();
        map.insert("1bad name".to_string(), Udm::int(1));
        assert!(serialise(&Udm::object(map), &defaults()).is_err());
    }

    #[test]
    fn entities_unescape_on_parse_and_escape_on_write() {
        let doc = parse_str("<a>x &amp; y</a>");
        assert_eq!(doc.as_object().unwrap()["a"], Udm::string("x & y"));
        let out = String::from_utf8(serialise(&doc, &defaults()).unwrap()).unwrap();
        assert!(out.contains("x &amp; y"));
    }

    #[test]
    fn mismatched_tags_fail() {
        assert!(parse(b"<a><b></a></b>", &defaults()).is_err());
    }
}
