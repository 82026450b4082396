use std::fmt;
use thiserror::Error;

/// Every failure the library can report.
///
/// Invalid nodes carry their `Error` by value, so the type is cheap to
/// clone and comparable in tests. Navigation variants record the textual
/// path of the node the operation was attempted on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed JSON input, reported eagerly by [`Document::parse`].
    ///
    /// [`Document::parse`]: crate::Document::parse
    #[error("invalid JSON at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    /// A path string that does not lex: unclosed bracket, missing quote,
    /// invalid slice, unexpected character.
    #[error("path syntax error at column {column}: {message}")]
    Path { column: usize, message: String },

    /// Predicate expression failure, either at parse time or during
    /// evaluation (ordering between incomparable types, unknown function).
    #[error("filter expression error: {0}")]
    Filter(String),

    #[error("key {key:?} not found at `{path}`")]
    KeyNotFound { key: String, path: String },

    #[error("index {index} out of bounds (len {len}) at `{path}`")]
    IndexOutOfBounds { index: i64, len: usize, path: String },

    #[error("cannot access key {key:?} on {kind} at `{path}`")]
    NotAnObject {
        key: String,
        kind: NodeType,
        path: String,
    },

    #[error("cannot index into {kind} at `{path}`")]
    NotAnArray { kind: NodeType, path: String },

    #[error("node at `{path}` has no parent")]
    NoParent { path: String },

    /// A typed accessor was called on a node of the wrong variant.
    #[error("expected {expected}, found {found} at `{path}`")]
    Type {
        expected: &'static str,
        found: NodeType,
        path: String,
    },

    #[error("time value at `{path}` is not RFC 3339: {message}")]
    Time { path: String, message: String },

    #[error("unknown function {name:?}")]
    UnknownFunc { name: String },

    #[error("cannot delete the document root")]
    DeleteRoot,

    #[error("deleting array elements is not implemented")]
    DeleteArrayElement,

    #[error("cannot descend through {kind} at segment {segment:?}")]
    SetThroughScalar { kind: NodeType, segment: String },

    #[error("invalid array index {segment:?}: {message}")]
    BadArrayIndex { segment: String, message: String },

    #[error("value is not representable as JSON: {0}")]
    InvalidValue(String),

    #[error("recursion limit exceeded ({limit})")]
    RecursionLimit { limit: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Variant tag of a [`Node`](crate::Node).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Object,
    Array,
    String,
    Number,
    Bool,
    Null,
    Invalid,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Object => "object",
            NodeType::Array => "array",
            NodeType::String => "string",
            NodeType::Number => "number",
            NodeType::Bool => "bool",
            NodeType::Null => "null",
            NodeType::Invalid => "invalid",
        };
        f.write_str(name)
    }
}
