//! XML helper builtins over qualified names and namespace metadata

use super::{fail, fndef, Args, FnCtx, Registry};
use crate::error::EngineResult;
use crate::format::{self, Format, FormatOptions};
use crate::udm::{Udm, UdmKind};

pub(crate) fn register(registry: &mut Registry) {
    fndef!(registry, "localName", 1..=1, ["qualified name"], local_name);
    fndef!(registry, "qualifiedName", 2..=2, ["prefix", "local name"], qualified_name);
    fndef!(registry, "namespaceUri", 1..=2, ["element", "prefix"], namespace_uri);
    fndef!(registry, "canonicalizeXml", 1..=1, ["xml string"], canonicalize_xml);
}

/// Light-weight canonical form: re-parse and re-serialise so insignificant
/// whitespace disappears, attributes sort by name, and the declaration is
/// dropped. Not a full W3C C14N implementation.
fn canonicalize_xml(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("canonicalizeXml", args);
    let source = args.next_str()?;
    let mut document = format::parse_format(source.as_bytes(), Format::Xml, &FormatOptions::default())
        .map_err(|e| {
            fail(
                "canonicalizeXml",
                "a well-formed XML document",
                e.to_string(),
                "",
            )
        })?;
    sort_attributes(&mut document);
    let mut options = FormatOptions::default();
    options.encoding = Some("NONE".to_string());
    let bytes = format::serialise_format(&document, Format::Xml, &options).map_err(|e| {
        fail("canonicalizeXml", "a serialisable document", e.to_string(), "")
    })?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let without_decl = text
        .strip_prefix("<?xml version=\"1.0\"?>")
        .unwrap_or(&text)
        .trim_start()
        .to_string();
    Ok(Udm::string(without_decl))
}

fn sort_attributes(value: &mut Udm) {
    if value.has_attributes() {
        value.attributes_mut().sort_keys();
    }
    match &mut value.kind {
        UdmKind::Object(map) => {
            for (_, child) in map.iter_mut() {
                sort_attributes(child);
            }
        }
        UdmKind::Array(items) => {
            for item in items {
                sort_attributes(item);
            }
        }
        _ => {}
    }
}

/// The part of a qualified name after its prefix: `po:Id` → `Id`
fn local_name(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("localName", args);
    let name = args.next_str()?;
    let local = name.rsplit(':').next().unwrap_or(&name);
    Ok(Udm::string(local))
}

fn qualified_name(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("qualifiedName", args);
    let prefix = args.next_str()?;
    let local = args.next_str()?;
    if prefix.is_empty() {
        Ok(Udm::string(local))
    } else {
        Ok(Udm::string(format!("{}:{}", prefix, local)))
    }
}

/// Resolves a prefix against the namespaces recorded on an element; with
/// one argument, the default namespace. Null when the prefix is unbound.
fn namespace_uri(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("namespaceUri", args);
    let element = args.next()?;
    let prefix = match args.opt_next() {
        Some(value) => value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| fail("namespaceUri", "a prefix string", value.type_name(), ""))?,
        None => String::new(),
    };
    Ok(element
        .metadata()
        .namespaces
        .get(&prefix)
        .map(|uri| Udm::string(uri.clone()))
        .unwrap_or_else(Udm::null))
}
