//! CSV adapter
//!
//! With `headers: true` (the default) a document parses to an Array of
//! Objects, one per row, with keys in column order; with `headers: false`
//! it parses to an Array of Arrays. Cells are always string scalars, never
//! auto-typed. Quote, delimiter and line-break options are honoured on both
//! sides; a leading BOM is tolerated on input and written on output only
//! when `includeBOM` is set.

use super::{ensure_serialisable, strip_bom, FormatOptions};
use crate::error::{EngineError, EngineResult};
use crate::udm::{Udm, UdmKind};
use csv::{ReaderBuilder, Terminator, WriterBuilder};
use indexmap::IndexMap;

const FORMAT: &str = "csv";

fn single_byte(option: &str, name: &str, format_err: fn(&'static str, String) -> EngineError) -> EngineResult<u8> {
    let bytes = option.as_bytes();
    if bytes.len() == 1 {
        Ok(bytes[0])
    } else {
        Err(format_err(
            FORMAT,
            format!("option '{}' must be a single byte, got {:?}", name, option),
        ))
    }
}

fn parse_err(format: &'static str, message: String) -> EngineError {
    EngineError::FormatParse { format, message }
}

fn serialise_err(format: &'static str, message: String) -> EngineError {
    EngineError::FormatSerialise { format, message }
}

fn terminator(line_break: &str, name: &str, for_parse: bool) -> EngineResult<Option<Terminator>> {
    match line_break {
        "\n" => Ok(None),
        "\r\n" => Ok(Some(Terminator::CRLF)),
        other => {
            let err = if for_parse { parse_err } else { serialise_err };
            single_byte(other, name, err).map(|b| Some(Terminator::Any(b)))
        }
    }
}

/// Parses CSV bytes into an Array of Objects (or Arrays without headers)
pub fn parse(bytes: &[u8], options: &FormatOptions) -> EngineResult<Udm> {
    let bytes = strip_bom(bytes);
    let mut builder = ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .delimiter(single_byte(&options.delimiter, "delimiter", parse_err)?)
        .quote(single_byte(&options.quote, "quote", parse_err)?);
    if let Some(t) = terminator(&options.line_break, "lineBreak", true)? {
        builder.terminator(t);
    }

    let mut reader = builder.from_reader(bytes);
    let mut headers: Option<Vec<String>> = None;
    let mut rows: Vec<Udm> = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| parse_err(FORMAT, e.to_string()))?;
        let cells: Vec<&str> = record.iter().collect();
        if options.headers && headers.is_none() {
            headers = Some(cells.iter().map(|c| c.to_string()).collect());
            continue;
        }
        match &headers {
            Some(columns) => {
                let mut row: IndexMap<String, Udm> = IndexMap::with_capacity(columns.len());
                for (i, column) in columns.iter().enumerate() {
                    let cell = cells.get(i).copied().unwrap_or("");
                    row.insert(column.clone(), Udm::string(cell));
                }
                rows.push(Udm::object(row));
            }
            None => {
                rows.push(Udm::array(
                    cells.into_iter().map(Udm::string).collect(),
                ));
            }
        }
    }
    Ok(Udm::array(rows))
}

/// Serialises an Array of Objects (or Arrays) as CSV bytes
///
/// For objects, column order is the union of keys in first-row order;
/// missing cells emit empty fields.
pub fn serialise(value: &Udm, options: &FormatOptions) -> EngineResult<Vec<u8>> {
    ensure_serialisable(value, FORMAT)?;
    let rows = value.as_array().ok_or_else(|| {
        serialise_err(
            FORMAT,
            format!("CSV output requires an array of rows, got {}", value.type_name()),
        )
    })?;

    let mut builder = WriterBuilder::new();
    builder
        .delimiter(single_byte(&options.delimiter, "delimiter", serialise_err)?)
        .quote(single_byte(&options.quote, "quote", serialise_err)?);
    if let Some(t) = terminator(&options.line_break, "lineBreak", false)? {
        builder.terminator(t);
    }
    let mut writer = builder.from_writer(Vec::new());

    let object_rows = rows.iter().all(|r| r.as_object().is_some());
    if object_rows && !rows.is_empty() {
        let mut columns: Vec<String> = Vec::new();
        for row in rows {
            for key in row.as_object().expect("object row").keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        if options.headers {
            writer
                .write_record(&columns)
                .map_err(|e| serialise_err(FORMAT, e.to_string()))?;
        }
        for row in rows {
            let map = row.as_object().expect("object row");
            let record: Vec<String> = columns
                .iter()
                .map(|column| map.get(column).map(cell_text).unwrap_or_default())
                .collect();
            writer
                .write_record(&record)
                .map_err(|e| serialise_err(FORMAT, e.to_string()))?;
        }
    } else {
        for row in rows {
            match &row.kind {
                UdmKind::Array(cells) => {
                    let record: Vec<String> = cells.iter().map(cell_text).collect();
                    writer
                        .write_record(&record)
                        .map_err(|e| serialise_err(FORMAT, e.to_string()))?;
                }
                _ => {
                    return Err(serialise_err(
                        FORMAT,
                        format!(
                            "CSV rows must all be objects or all arrays, got {}",
                            row.type_name()
                        ),
                    ));
                }
            }
        }
    }

    let body = writer
        .into_inner()
        .map_err(|e| serialise_err(FORMAT, e.to_string()))?;
    if options.include_bom {
        let mut out = Vec::with_capacity(body.len() + 3);
        out.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
        out.extend_from_slice(&body);
        Ok(out)
    } else {
        Ok(body)
    }
}

fn cell_text(value: &Udm) -> String {
    match &value.kind {
        UdmKind::Null => String::new(),
        _ => value.to_display_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> FormatOptions {
        FormatOptions::default()
    }

    #[test]
    fn header_mode_yields_objects_in_column_order() {
        let udm = parse(b"id,name\nC1,Alice\nC2,Bob\n", &defaults()).unwrap();
        let rows = udm.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        let first = rows[0].as_object().unwrap();
        let keys: Vec<&str> = first.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "name"]);
        assert_eq!(first["name"], Udm::string("Alice"));
    }

    #[test]
    fn no_header_mode_yields_arrays() {
        let mut options = defaults();
        options.headers = false;
        let udm = parse(b"1,2\n3,4\n", &options).unwrap();
        assert_eq!(
            udm.as_array().unwrap()[1],
            Udm::array(vec![Udm::string("3"), Udm::string("4")])
        );
    }

    #[test]
    fn cells_are_never_auto_typed() {
        let udm = parse(b"n\n42\n", &defaults()).unwrap();
        assert_eq!(
            udm.as_array().unwrap()[0].as_object().unwrap()["n"],
            Udm::string("42")
        );
    }

    #[test]
    fn quoted_fields_with_commas_newlines_and_quotes() {
        let source = b"a,b\n\"x,y\",\"line1\nline2\"\n\"he said \"\"hi\"\"\",plain\n";
        let udm = parse(source, &defaults()).unwrap();
        let rows = udm.as_array().unwrap();
        let first = rows[0].as_object().unwrap();
        assert_eq!(first["a"], Udm::string("x,y"));
        assert_eq!(first["b"], Udm::string("line1\nline2"));
        let second = rows[1].as_object().unwrap();
        assert_eq!(second["a"], Udm::string("he said \"hi\""));
    }

    #[test]
    fn custom_delimiter_and_quote() {
        let mut options = defaults();
        options.delimiter = ";".to_string();
        options.quote = "'".to_string();
        let udm = parse(b"a;b\n'x;y';2\n", &options).unwrap();
        assert_eq!(
            udm.as_array().unwrap()[0].as_object().unwrap()["a"],
            Udm::string("x;y")
        );
    }

    #[test]
    fn multi_byte_delimiter_is_rejected() {
        let mut options = defaults();
        options.delimiter = "::".to_string();
        assert!(parse(b"a::b\n", &options).is_err());
    }

    #[test]
    fn round_trip_preserves_rows() {
        let source = b"id,name\nC1,Alice\nC2,Bob\n";
        let udm = parse(source, &defaults()).unwrap();
        let out = serialise(&udm, &defaults()).unwrap();
        assert_eq!(out, source.to_vec());
    }

    #[test]
    fn union_of_keys_in_first_row_order() {
        let rows = Udm::array(vec![
            Udm::object(
                [("a".to_string(), Udm::string("1")), ("b".to_string(), Udm::string("2"))]
                    .into_iter()
                    .collect(),
            ),
            Udm::object(
                [("b".to_string(), Udm::string("3")), ("c".to_string(), Udm::string("4"))]
                    .into_iter()
                    .collect(),
            ),
        ]);
        let out = String::from_utf8(serialise(&rows, &defaults()).unwrap()).unwrap();
        assert_eq!(out, "a,b,c\n1,2,\n,3,4\n");
    }

    #[test]
    fn bom_tolerated_on_input_optional_on_output() {
        let udm = parse(b"\xEF\xBB\xBFa\n1\n", &defaults()).unwrap();
        assert_eq!(
            udm.as_array().unwrap()[0].as_object().unwrap()["a"],
            Udm::string("1")
        );
        let mut options = defaults();
        options.include_bom = true;
        let out = serialise(&udm, &options).unwrap();
        assert!(out.starts_with(&[0xEF, 0xBB, 0xBF]));
    }

    #[test]
    fn empty_input_round_trips_to_empty_array() {
        let udm = parse(b"", &defaults()).unwrap();
        assert_eq!(udm, Udm::array(vec![]));
        assert_eq!(serialise(&udm, &defaults()).unwrap(), Vec::<u8>::new());
    }
}
