//! Error enhancer
//!
//! Enriches name-lookup and field-access failures with suggestions drawn
//! from the fields actually present in the bound inputs: typos are detected
//! by edit distance, and the common "missing lambda parameter" mistake
//! (`filter(xs, Foo == 1)` instead of `filter(xs, x => x.Foo == 1)`) is
//! recognised when an unknown identifier names a known input field.
//!
//! Enhancement never changes semantics: errors that match no rule pass
//! through unchanged.

use crate::error::EngineError;
use crate::udm::{Udm, UdmKind};
use indexmap::IndexMap;

/// Maximum edit distance for a typo suggestion
const TYPO_THRESHOLD: usize = 3;
/// Field collection bounds, so pathological inputs stay cheap
const MAX_FIELDS: usize = 512;
const MAX_DEPTH: usize = 4;
const MAX_ARRAY_SAMPLE: usize = 8;

/// Field names known per input, cached once when inputs are bound
#[derive(Debug, Clone, Default)]
pub struct FieldIndex {
    /// field name → name of the input it was seen in
    fields: IndexMap<String, String>,
}

impl FieldIndex {
    /// Collects object keys (CSV headers arrive as row-object keys) from
    /// every bound input
    pub fn from_inputs<'a>(inputs: impl Iterator<Item = (&'a String, &'a Udm)>) -> Self {
        let mut index = FieldIndex::default();
        for (name, value) in inputs {
            collect_fields(value, name, 0, &mut index.fields);
        }
        index
    }

    /// True when the exact field name exists in some input
    pub fn input_of(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// The closest known field within the typo threshold
    pub fn closest(&self, name: &str) -> Option<(&str, &str)> {
        self.fields
            .iter()
            .map(|(field, input)| (levenshtein(name, field), field, input))
            .filter(|(distance, field, _)| *distance <= TYPO_THRESHOLD && *field != name)
            .min_by_key(|(distance, ..)| *distance)
            .map(|(_, field, input)| (field.as_str(), input.as_str()))
    }
}

fn collect_fields(value: &Udm, input: &str, depth: usize, out: &mut IndexMap<String, String>) {
    if depth > MAX_DEPTH || out.len() >= MAX_FIELDS {
        return;
    }
    match &value.kind {
        UdmKind::Object(map) => {
            for (key, child) in map {
                if out.len() >= MAX_FIELDS {
                    return;
                }
                out.entry(key.clone()).or_insert_with(|| input.to_string());
                collect_fields(child, input, depth + 1, out);
            }
        }
        UdmKind::Array(items) => {
            for item in items.iter().take(MAX_ARRAY_SAMPLE) {
                collect_fields(item, input, depth + 1, out);
            }
        }
        _ => {}
    }
}

/// Wraps an evaluation error with a suggestion when one applies
pub fn enhance(error: EngineError, index: &FieldIndex) -> EngineError {
    match &error {
        EngineError::UndefinedVariable { name, .. } => {
            // An unbound bare identifier that names a real input field is
            // almost always a lambda body written without its parameter
            if let Some(input) = index.input_of(name) {
                let correct = format!("filter(${}, x => x.{} == ...)", input, name);
                let incorrect = format!("filter(${}, {} == ...)", input, name);
                return EngineError::Enhanced {
                    code: "UTLX-002",
                    message: format!(
                        "'{}' is not defined, but it is a field of input '{}'. \
                         Inside functions like filter and map, fields must be reached \
                         through the lambda parameter.",
                        name, input
                    ),
                    suggestion: correct.clone(),
                    correct_example: Some(correct),
                    incorrect_example: Some(incorrect),
                    source: Box::new(error),
                };
            }
            if let Some((field, _)) = index.closest(name) {
                let name = name.to_string();
                let field = field.to_string();
                return typo_suggestion(&name, &field, error);
            }
            error
        }
        EngineError::PropertyNotFound { key, .. } => {
            if let Some((field, _)) = index.closest(key) {
                let key = key.to_string();
                let field = field.to_string();
                return typo_suggestion(&key, &field, error);
            }
            error
        }
        _ => error,
    }
}

fn typo_suggestion(wrong: &str, field: &str, source: EngineError) -> EngineError {
    EngineError::Enhanced {
        code: "UTLX-001",
        message: format!("unknown field '{}', did you mean '{}'?", wrong, field),
        suggestion: field.to_string(),
        correct_example: None,
        incorrect_example: None,
        source: Box::new(source),
    }
}

/// Classic single-row Levenshtein edit distance
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut previous_diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous_diagonal + usize::from(ca != cb);
            previous_diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(previous_diagonal + 1);
        }
    }
    row[b.len()]
}
