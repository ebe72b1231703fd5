//! The Unified Data Model (UDM)
//!
//! Every format adapter parses into — and serialises from — this single
//! in-memory representation. A [`Udm`] node is a tagged value plus two
//! orthogonal side-channels: an ordered attribute map (XML attributes, CSV
//! row identity) and format metadata (original encoding, namespace URIs,
//! schema kind). Attributes take part in structural equality; metadata
//! never does.
//!
//! Values are immutable after construction: every transformation builds new
//! nodes and leaves its inputs intact.

use crate::ast::Expr;
use crate::env::Env;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;

/// Ordered string-keyed mapping used for objects and attribute channels
pub type UdmObject = IndexMap<String, Udm>;

/// The attribute side-channel: ordered name → scalar mapping
pub type Attributes = IndexMap<String, Udm>;

/// Wrapper allowing an empty attribute map in a `static`: `Udm` contains
/// `Rc`, so it is never `Sync`, but an always-empty map has no `Rc` to race on.
struct EmptyAttrs(Attributes);
unsafe impl Sync for EmptyAttrs {}
unsafe impl Send for EmptyAttrs {}

static EMPTY_ATTRS: Lazy<EmptyAttrs> = Lazy::new(|| EmptyAttrs(IndexMap::new()));
static EMPTY_META: Lazy<Metadata> = Lazy::new(Metadata::default);

/// A first-class function value: parameters, body and captured environment
#[derive(Debug, Clone)]
pub struct LambdaValue {
    /// Parameter names, bound positionally on application
    pub params: SmallVec<[String; 4]>,
    /// Body expression, shared with the AST it was built from
    pub body: Rc<Expr>,
    /// Environment captured at the point of definition
    pub env: Env,
}

/// How an XML node was classified by the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// A regular element node
    Element,
    /// A synthetic text entry inside mixed content
    Text,
}

/// Format-specific annotations carried alongside a value
///
/// Metadata is readable through a dedicated accessor and never affects
/// equality of user-visible values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Original document encoding as declared by the source (e.g. "UTF-8")
    pub encoding: Option<String>,
    /// Schema dialect when the value was read as data ("xsd" or "jsch")
    pub schema_type: Option<String>,
    /// Namespace prefix → URI table collected from the source element
    pub namespaces: IndexMap<String, String>,
    /// Element-versus-text classification for XML round-trips
    pub node_class: Option<NodeClass>,
    /// Set on the object wrapping a parsed document's root element; object
    /// spread unwraps such wrappers so root children merge directly
    pub document: bool,
}

impl Metadata {
    /// Returns true when no field is set
    pub fn is_empty(&self) -> bool {
        self.encoding.is_none()
            && self.schema_type.is_none()
            && self.namespaces.is_empty()
            && self.node_class.is_none()
            && !self.document
    }
}

/// The tagged union of value variants
#[derive(Debug, Clone)]
pub enum UdmKind {
    /// The distinct first-class null value
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Opaque bytes (base64 round-trips, compressed blobs)
    Binary(Vec<u8>),
    /// Calendar date without time or zone
    Date(NaiveDate),
    /// Time of day without date or zone
    Time(NaiveTime),
    /// Date and time without zone
    LocalDateTime(NaiveDateTime),
    /// Absolute instant, normalised to UTC at construction
    DateTime(DateTime<Utc>),
    /// Ordered, possibly heterogeneous sequence
    Array(Vec<Udm>),
    /// Ordered mapping with unique keys; insertion order is observable
    Object(UdmObject),
    /// First-class function value; never serialisable
    Lambda(Rc<LambdaValue>),
}

/// Attribute and metadata channels, boxed so plain values stay lean
#[derive(Debug, Clone, Default)]
struct NodeExtra {
    attributes: Attributes,
    metadata: Metadata,
}

/// A node of the unified data model
#[derive(Debug, Clone)]
pub struct Udm {
    /// The value variant
    pub kind: UdmKind,
    extra: Option<Box<NodeExtra>>,
}

impl Udm {
    /// The null scalar
    pub fn null() -> Self {
        UdmKind::Null.into()
    }

    /// A boolean scalar
    pub fn bool(b: bool) -> Self {
        UdmKind::Bool(b).into()
    }

    /// An integer scalar
    pub fn int(i: i64) -> Self {
        UdmKind::Int(i).into()
    }

    /// A float scalar
    pub fn float(f: f64) -> Self {
        UdmKind::Float(f).into()
    }

    /// A string scalar
    pub fn string(s: impl Into<String>) -> Self {
        UdmKind::Str(s.into()).into()
    }

    /// An opaque byte sequence
    pub fn binary(bytes: Vec<u8>) -> Self {
        UdmKind::Binary(bytes).into()
    }

    /// An array value
    pub fn array(items: Vec<Udm>) -> Self {
        UdmKind::Array(items).into()
    }

    /// An object value
    pub fn object(map: UdmObject) -> Self {
        UdmKind::Object(map).into()
    }

    /// An empty object value
    pub fn empty_object() -> Self {
        UdmKind::Object(IndexMap::new()).into()
    }

    /// A date value
    pub fn date(d: NaiveDate) -> Self {
        UdmKind::Date(d).into()
    }

    /// A time-of-day value
    pub fn time(t: NaiveTime) -> Self {
        UdmKind::Time(t).into()
    }

    /// A zoneless date-time value
    pub fn local_date_time(dt: NaiveDateTime) -> Self {
        UdmKind::LocalDateTime(dt).into()
    }

    /// An absolute instant, normalised to UTC
    pub fn date_time(dt: DateTime<Utc>) -> Self {
        UdmKind::DateTime(dt).into()
    }

    /// A lambda value
    pub fn lambda(value: LambdaValue) -> Self {
        UdmKind::Lambda(Rc::new(value)).into()
    }

    /// Returns the attribute channel (empty for most nodes)
    pub fn attributes(&self) -> &Attributes {
        match &self.extra {
            Some(extra) => &extra.attributes,
            None => &EMPTY_ATTRS.0,
        }
    }

    /// Returns a mutable attribute channel, allocating it on first use
    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.extra.get_or_insert_with(Default::default).attributes
    }

    /// Looks up a single attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Udm> {
        self.extra.as_ref()?.attributes.get(name)
    }

    /// Sets an attribute, allocating the channel on first use
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Udm) {
        self.attributes_mut().insert(name.into(), value);
    }

    /// Returns true when the node carries at least one attribute
    pub fn has_attributes(&self) -> bool {
        self.extra
            .as_ref()
            .is_some_and(|e| !e.attributes.is_empty())
    }

    /// Returns the metadata channel (default for most nodes)
    pub fn metadata(&self) -> &Metadata {
        match &self.extra {
            Some(extra) => &extra.metadata,
            None => &EMPTY_META,
        }
    }

    /// Returns mutable metadata, allocating the channel on first use
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.extra.get_or_insert_with(Default::default).metadata
    }

    /// Builder-style attribute attachment
    pub fn with_attribute(mut self, name: impl Into<String>, value: Udm) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// A short name for the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            UdmKind::Null => "null",
            UdmKind::Bool(_) => "boolean",
            UdmKind::Int(_) => "number",
            UdmKind::Float(_) => "number",
            UdmKind::Str(_) => "string",
            UdmKind::Binary(_) => "binary",
            UdmKind::Date(_) => "date",
            UdmKind::Time(_) => "time",
            UdmKind::LocalDateTime(_) => "localdatetime",
            UdmKind::DateTime(_) => "datetime",
            UdmKind::Array(_) => "array",
            UdmKind::Object(_) => "object",
            UdmKind::Lambda(_) => "function",
        }
    }

    /// Returns true for the five scalar variants
    pub fn is_scalar(&self) -> bool {
        matches!(
            self.kind,
            UdmKind::Null
                | UdmKind::Bool(_)
                | UdmKind::Int(_)
                | UdmKind::Float(_)
                | UdmKind::Str(_)
        )
    }

    /// Returns true for the null scalar
    pub fn is_null(&self) -> bool {
        matches!(self.kind, UdmKind::Null)
    }

    /// Returns the string payload if this is a string scalar
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            UdmKind::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload if this is an integer scalar
    pub fn as_int(&self) -> Option<i64> {
        match self.kind {
            UdmKind::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Returns the boolean payload if this is a boolean scalar
    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            UdmKind::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Returns a numeric view of Int or Float scalars
    pub fn as_number(&self) -> Option<f64> {
        match self.kind {
            UdmKind::Int(i) => Some(i as f64),
            UdmKind::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Returns the element slice if this is an array
    pub fn as_array(&self) -> Option<&[Udm]> {
        match &self.kind {
            UdmKind::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the mapping if this is an object
    pub fn as_object(&self) -> Option<&UdmObject> {
        match &self.kind {
            UdmKind::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the lambda payload if this is a function value
    pub fn as_lambda(&self) -> Option<&Rc<LambdaValue>> {
        match &self.kind {
            UdmKind::Lambda(l) => Some(l),
            _ => None,
        }
    }

    /// The truthiness table used by `&&`, `||`, `!` coercion and guards:
    /// null, false, 0, "", [] and {} are false, everything else is true
    pub fn is_truthy(&self) -> bool {
        match &self.kind {
            UdmKind::Null => false,
            UdmKind::Bool(b) => *b,
            UdmKind::Int(i) => *i != 0,
            UdmKind::Float(f) => *f != 0.0,
            UdmKind::Str(s) => !s.is_empty(),
            UdmKind::Array(items) => !items.is_empty(),
            UdmKind::Object(map) => !map.is_empty(),
            _ => true,
        }
    }

    /// Canonical string form used by `+` concatenation and `toString`
    pub fn to_display_string(&self) -> String {
        let mut out = String::new();
        self.write_display(&mut out);
        out
    }

    fn write_display(&self, out: &mut String) {
        match &self.kind {
            UdmKind::Null => out.push_str("null"),
            UdmKind::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            UdmKind::Int(i) => out.push_str(&i.to_string()),
            UdmKind::Float(f) => out.push_str(&f.to_string()),
            UdmKind::Str(s) => out.push_str(s),
            UdmKind::Binary(bytes) => out.push_str(&format!("<{} bytes>", bytes.len())),
            UdmKind::Date(d) => out.push_str(&d.format("%Y-%m-%d").to_string()),
            UdmKind::Time(t) => out.push_str(&t.format("%H:%M:%S").to_string()),
            UdmKind::LocalDateTime(dt) => {
                out.push_str(&dt.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
            UdmKind::DateTime(dt) => out.push_str(&dt.to_rfc3339()),
            UdmKind::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_quoted(out);
                }
                out.push(']');
            }
            UdmKind::Object(map) => {
                out.push('{');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push('"');
                    out.push_str(key);
                    out.push_str("\":");
                    value.write_quoted(out);
                }
                out.push('}');
            }
            UdmKind::Lambda(_) => out.push_str("<function>"),
        }
    }

    // String scalars render quoted inside container displays
    fn write_quoted(&self, out: &mut String) {
        if let UdmKind::Str(s) = &self.kind {
            out.push('"');
            out.push_str(s);
            out.push('"');
        } else {
            self.write_display(out);
        }
    }
}

impl From<UdmKind> for Udm {
    fn from(kind: UdmKind) -> Self {
        Udm { kind, extra: None }
    }
}

impl From<bool> for Udm {
    fn from(b: bool) -> Self {
        Udm::bool(b)
    }
}

impl From<i64> for Udm {
    fn from(i: i64) -> Self {
        Udm::int(i)
    }
}

impl From<f64> for Udm {
    fn from(f: f64) -> Self {
        Udm::float(f)
    }
}

impl From<&str> for Udm {
    fn from(s: &str) -> Self {
        Udm::string(s)
    }
}

impl From<String> for Udm {
    fn from(s: String) -> Self {
        Udm::string(s)
    }
}

impl PartialEq for Udm {
    /// Deep structural equality over value and attributes; metadata is
    /// excluded. Int and Float compare by mathematical value, so `1 == 1.0`.
    fn eq(&self, other: &Self) -> bool {
        let kinds_equal = match (&self.kind, &other.kind) {
            (UdmKind::Null, UdmKind::Null) => true,
            (UdmKind::Bool(a), UdmKind::Bool(b)) => a == b,
            (UdmKind::Int(a), UdmKind::Int(b)) => a == b,
            (UdmKind::Float(a), UdmKind::Float(b)) => a == b,
            (UdmKind::Int(a), UdmKind::Float(b)) | (UdmKind::Float(b), UdmKind::Int(a)) => {
                *a as f64 == *b
            }
            (UdmKind::Str(a), UdmKind::Str(b)) => a == b,
            (UdmKind::Binary(a), UdmKind::Binary(b)) => a == b,
            (UdmKind::Date(a), UdmKind::Date(b)) => a == b,
            (UdmKind::Time(a), UdmKind::Time(b)) => a == b,
            (UdmKind::LocalDateTime(a), UdmKind::LocalDateTime(b)) => a == b,
            (UdmKind::DateTime(a), UdmKind::DateTime(b)) => a == b,
            (UdmKind::Array(a), UdmKind::Array(b)) => a == b,
            (UdmKind::Object(a), UdmKind::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
            }
            (UdmKind::Lambda(a), UdmKind::Lambda(b)) => Rc::ptr_eq(a, b),
            _ => false,
        };
        kinds_equal && self.attributes() == other.attributes()
    }
}

impl fmt::Display for Udm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_float_equality_is_mathematical() {
        assert_eq!(Udm::int(1), Udm::float(1.0));
        assert_ne!(Udm::int(1), Udm::float(1.5));
    }

    #[test]
    fn object_equality_is_order_sensitive() {
        let mut a = IndexMap::new();
        a.insert("x".to_string(), Udm::int(1));
        a.insert("y".to_string(), Udm::int(2));
        let mut b = IndexMap::new();
        b.insert("y".to_string(), Udm::int(2));
        b.insert("x".to_string(), Udm::int(1));
        assert_ne!(Udm::object(a), Udm::object(b));
    }

    #[test]
    fn attributes_participate_in_equality() {
        let plain = Udm::string("A");
        let attributed = Udm::string("A").with_attribute("id", Udm::string("1"));
        assert_ne!(plain, attributed);
    }

    #[test]
    fn metadata_does_not_affect_equality() {
        let plain = Udm::string("A");
        let mut annotated = Udm::string("A");
        annotated.metadata_mut().encoding = Some("UTF-8".to_string());
        assert_eq!(plain, annotated);
    }

    #[test]
    fn truthiness_table() {
        assert!(!Udm::null().is_truthy());
        assert!(!Udm::bool(false).is_truthy());
        assert!(!Udm::int(0).is_truthy());
        assert!(!Udm::string("").is_truthy());
        assert!(!Udm::array(vec![]).is_truthy());
        assert!(!Udm::empty_object().is_truthy());
        assert!(Udm::float(0.5).is_truthy());
        assert!(Udm::string("x").is_truthy());
    }

    #[test]
    fn display_string_forms() {
        assert_eq!(Udm::null().to_display_string(), "null");
        assert_eq!(Udm::int(42).to_display_string(), "42");
        assert_eq!(Udm::float(1.5).to_display_string(), "1.5");
        assert_eq!(
            Udm::array(vec![Udm::int(1), Udm::string("a")]).to_display_string(),
            r#"[1,"a"]"#
        );
    }
}
