//! Format adapters: bytes ⇄ UDM
//!
//! One submodule per external format. Each adapter implements
//! `parse(bytes, options) → Udm` and `serialise(&Udm, options) → bytes`,
//! round-tripping structure plus the format-carried information (XML
//! attributes and namespaces, CSV headers, original encodings) needed to
//! serialise back faithfully.
//!
//! Policy shared by all adapters: a UTF-8 byte order mark is tolerated on
//! input and stripped before parsing; JSON and YAML output never carries a
//! BOM; CSV output emits one only when `includeBOM` is set.

pub mod csv;
pub mod json;
pub mod schema;
pub mod xml;
pub mod yaml;

use crate::error::{EngineError, EngineResult, Position};
use crate::udm::{Udm, UdmKind};

/// The format identifiers accepted in script headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Xml,
    Csv,
    Yaml,
    /// XML Schema read as data (input only)
    Xsd,
    /// JSON Schema read as data (input only)
    JsonSchema,
    /// Content-sniffing detection (input only)
    Auto,
}

impl Format {
    /// Resolves a header format identifier
    pub fn from_name(name: &str) -> Option<Format> {
        match name {
            "json" => Some(Format::Json),
            "xml" => Some(Format::Xml),
            "csv" => Some(Format::Csv),
            "yaml" => Some(Format::Yaml),
            "xsd" => Some(Format::Xsd),
            "jsch" => Some(Format::JsonSchema),
            "auto" => Some(Format::Auto),
            _ => None,
        }
    }

    /// The identifier as written in headers
    pub fn name(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Xml => "xml",
            Format::Csv => "csv",
            Format::Yaml => "yaml",
            Format::Xsd => "xsd",
            Format::JsonSchema => "jsch",
            Format::Auto => "auto",
        }
    }

    /// Returns true for formats usable in an `output` declaration
    pub fn is_output_capable(&self) -> bool {
        matches!(
            self,
            Format::Json | Format::Xml | Format::Csv | Format::Yaml
        )
    }
}

/// A single option value from a header option map
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl OptionValue {
    fn kind(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "boolean",
            OptionValue::Int(_) => "integer",
            OptionValue::Str(_) => "string",
        }
    }
}

/// Typed view of the brace-delimited option maps from the header
///
/// One struct covers every format; the header parser validates that a key
/// is recognised for the declared format before setting it. Unknown keys
/// are a header error, never silently ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatOptions {
    /// CSV: first row carries column names
    pub headers: bool,
    /// CSV field delimiter (single byte)
    pub delimiter: String,
    /// CSV quote character (single byte)
    pub quote: String,
    /// CSV record terminator
    pub line_break: String,
    /// CSV output: emit a UTF-8 BOM for spreadsheet compatibility
    pub include_bom: bool,
    /// XML output encoding; "NONE" suppresses the encoding attribute
    pub encoding: Option<String>,
    /// JSON output: pretty-print
    pub pretty: bool,
    /// JSON output: pretty-print indent width
    pub indent: usize,
    /// JSON output: sort object keys instead of insertion order
    pub sort_keys: bool,
    /// JSON input: permit `//` and `/* */` comments
    pub allow_comments: bool,
    /// JSON input: permit trailing commas in objects and arrays
    pub allow_trailing_commas: bool,
    /// YAML output: flow style instead of block style
    pub flow_style: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            headers: true,
            delimiter: ",".to_string(),
            quote: "\"".to_string(),
            line_break: "\n".to_string(),
            include_bom: false,
            encoding: None,
            pretty: false,
            indent: 2,
            sort_keys: false,
            allow_comments: false,
            allow_trailing_commas: false,
            flow_style: false,
        }
    }
}

impl FormatOptions {
    /// Applies one `key: value` pair from a header option map, validating
    /// the key against the recognised set for `format`
    pub fn set(
        &mut self,
        format: Format,
        key: &str,
        value: OptionValue,
        position: Position,
    ) -> EngineResult<()> {
        let unknown = |key: &str| {
            EngineError::header(
                format!("unknown option '{}' for format {}", key, format.name()),
                position,
            )
        };
        let expect_bool = |value: &OptionValue| match value {
            OptionValue::Bool(b) => Ok(*b),
            other => Err(EngineError::header(
                format!("option '{}' expects a boolean, got {}", key, other.kind()),
                position,
            )),
        };
        let expect_str = |value: &OptionValue| match value {
            OptionValue::Str(s) => Ok(s.clone()),
            other => Err(EngineError::header(
                format!("option '{}' expects a string, got {}", key, other.kind()),
                position,
            )),
        };

        match (format, key) {
            (Format::Csv, "headers") => self.headers = expect_bool(&value)?,
            (Format::Csv, "delimiter") => self.delimiter = expect_str(&value)?,
            (Format::Csv, "quote") => self.quote = expect_str(&value)?,
            (Format::Csv, "lineBreak") => self.line_break = expect_str(&value)?,
            (Format::Csv, "includeBOM") => self.include_bom = expect_bool(&value)?,
            (Format::Xml, "encoding") => self.encoding = Some(expect_str(&value)?),
            (Format::Json, "pretty") => self.pretty = expect_bool(&value)?,
            (Format::Json, "indent") => match value {
                OptionValue::Int(i) if i >= 0 => self.indent = i as usize,
                other => {
                    return Err(EngineError::header(
                        format!(
                            "option 'indent' expects a non-negative integer, got {}",
                            other.kind()
                        ),
                        position,
                    ));
                }
            },
            (Format::Json, "sortKeys") => self.sort_keys = expect_bool(&value)?,
            (Format::Json, "allowComments") => self.allow_comments = expect_bool(&value)?,
            (Format::Json, "allowTrailingCommas") => {
                self.allow_trailing_commas = expect_bool(&value)?
            }
            (Format::Yaml, "flowStyle") => self.flow_style = expect_bool(&value)?,
            _ => return Err(unknown(key)),
        }
        Ok(())
    }
}

/// Strips a leading UTF-8 byte order mark, if present
pub(crate) fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

/// Decodes input bytes as UTF-8, surfacing a format parse error
pub(crate) fn decode_utf8<'a>(bytes: &'a [u8], format: &'static str) -> EngineResult<&'a str> {
    std::str::from_utf8(bytes)
        .map_err(|e| EngineError::format_parse(format, format!("invalid UTF-8: {}", e)))
}

/// Rejects values no adapter can render (lambdas anywhere in the tree)
pub(crate) fn ensure_serialisable(value: &Udm, format: &'static str) -> EngineResult<()> {
    match &value.kind {
        UdmKind::Lambda(_) => Err(EngineError::format_serialise(
            format,
            "a function value cannot be serialised",
        )),
        UdmKind::Array(items) => {
            for item in items {
                ensure_serialisable(item, format)?;
            }
            Ok(())
        }
        UdmKind::Object(map) => {
            for value in map.values() {
                ensure_serialisable(value, format)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Parses input bytes in the given format into a UDM tree
pub fn parse_format(bytes: &[u8], format: Format, options: &FormatOptions) -> EngineResult<Udm> {
    log::debug!("parsing {} bytes as {}", bytes.len(), format.name());
    match format {
        Format::Json => json::parse(bytes, options),
        Format::Xml => xml::parse(bytes, options),
        Format::Csv => csv::parse(bytes, options),
        Format::Yaml => yaml::parse(bytes, options),
        Format::Xsd => schema::parse_xsd(bytes, options),
        Format::JsonSchema => schema::parse_json_schema(bytes, options),
        Format::Auto => parse_format(bytes, detect(bytes), options),
    }
}

/// Serialises a UDM tree in the given output format
pub fn serialise_format(
    value: &Udm,
    format: Format,
    options: &FormatOptions,
) -> EngineResult<Vec<u8>> {
    log::debug!("serialising as {}", format.name());
    match format {
        Format::Json => json::serialise(value, options),
        Format::Xml => xml::serialise(value, options),
        Format::Csv => csv::serialise(value, options),
        Format::Yaml => yaml::serialise(value, options),
        other => Err(EngineError::format_serialise(
            other.name(),
            "format is input-only and cannot be used as an output target",
        )),
    }
}

/// Content sniffing for `auto` inputs: XML by leading `<`, JSON by leading
/// `{`/`[`/quote, CSV when the first line is delimiter-separated without
/// mapping syntax, YAML otherwise
fn detect(bytes: &[u8]) -> Format {
    let text = String::from_utf8_lossy(strip_bom(bytes));
    let trimmed = text.trim_start();
    match trimmed.chars().next() {
        Some('<') => Format::Xml,
        Some('{') | Some('[') | Some('"') => Format::Json,
        _ => {
            let first_line = trimmed.lines().next().unwrap_or("");
            if first_line.contains(',') && !first_line.contains(": ") {
                Format::Csv
            } else {
                Format::Yaml
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_round_trip() {
        for name in ["json", "xml", "csv", "yaml", "xsd", "jsch", "auto"] {
            assert_eq!(Format::from_name(name).unwrap().name(), name);
        }
        assert!(Format::from_name("toml").is_none());
    }

    #[test]
    fn unknown_option_is_rejected() {
        let mut opts = FormatOptions::default();
        let err = opts
            .set(
                Format::Json,
                "delimiter",
                OptionValue::Str(";".into()),
                Position::new(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Header { .. }));
    }

    #[test]
    fn option_value_kinds_are_checked() {
        let mut opts = FormatOptions::default();
        let err = opts
            .set(
                Format::Csv,
                "headers",
                OptionValue::Str("yes".into()),
                Position::new(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("expects a boolean"));
    }

    #[test]
    fn bom_is_stripped() {
        assert_eq!(strip_bom(b"\xEF\xBB\xBF{}"), b"{}");
        assert_eq!(strip_bom(b"{}"), b"{}");
    }

    #[test]
    fn detection_heuristics() {
        assert_eq!(detect(b"<root/>"), Format::Xml);
        assert_eq!(detect(b"  {\"a\":1}"), Format::Json);
        assert_eq!(detect(b"a,b,c\n1,2,3\n"), Format::Csv);
        assert_eq!(detect(b"a: 1\nb: 2\n"), Format::Yaml);
    }
}
