//! Error taxonomy.
//!
//! Payload faults are one [`ArgumentError`] carrying a kind, the structural
//! path where the walk stopped, and a message. Schema construction, path
//! lookup, normalization and declaration loading each get their own enum.
use thiserror::Error;

/// Which constraint a payload violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Required key missing, unknown key under strict mode, or missing flag.
    Key,
    /// Value's runtime kind is not accepted.
    Type,
    /// Value fails its extra check, or a flag names no choice.
    Value,
}

/// A payload fault located at a slash-joined structural path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[at {}] {message}", location(.path))]
pub struct ArgumentError {
    pub kind: ErrorKind,
    pub path: Vec<String>,
    pub message: String,
}

impl ArgumentError {
    pub fn key(path: &[String], message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Key, path: path.to_vec(), message: message.into() }
    }
    pub fn type_(path: &[String], message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Type, path: path.to_vec(), message: message.into() }
    }
    pub fn value(path: &[String], message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Value, path: path.to_vec(), message: message.into() }
    }

    pub fn is_key(&self) -> bool { self.kind == ErrorKind::Key }
    pub fn is_type(&self) -> bool { self.kind == ErrorKind::Type }
    pub fn is_value(&self) -> bool { self.kind == ErrorKind::Value }

    /// `a/b/0`, empty at the root.
    pub fn path_str(&self) -> String {
        self.path.join("/")
    }
}

fn location(path: &[String]) -> String {
    if path.is_empty() {
        "root location".to_string()
    } else {
        format!("location `{}`", path.join("/"))
    }
}

/// Raised while building or mutating a schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("duplicate key `{key}` in {context}")]
    Duplicate { key: String, context: String },

    #[error("optional variant `{flag}` needs a default tag")]
    MissingDefaultTag { flag: String },

    #[error("default tag `{tag}` is not a choice of variant `{flag}`")]
    InvalidDefaultTag { flag: String, tag: String },

    #[error("attaching `{child}` under `{parent}` would create a cycle")]
    Cycle { parent: String, child: String },
}

/// Raised by the path indexer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("`{node}` has no sub-field `{field}`")]
    NoField { node: String, field: String },

    #[error("`{node}` has no variant with flag `{flag}`")]
    NoVariant { node: String, flag: String },

    #[error("`{node}` declares no variants")]
    NoVariants { node: String },

    #[error("`{node}` has {count} variants, `[{tag}]` must name its flag")]
    AmbiguousFlag { node: String, count: usize, tag: String },

    #[error("variant `{flag}` has no choice `{tag}`")]
    NoChoice { flag: String, tag: String },

    #[error("malformed path segment `{segment}`")]
    Malformed { segment: String },
}

/// Raised by normalization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("pattern `{pattern}` conflicts with the following reserved names: {}", .names.join(", "))]
    TrimConflict { pattern: String, names: Vec<String> },

    #[error(transparent)]
    Argument(#[from] ArgumentError),
}

/// Raised when a trim pattern does not compile.
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("invalid regex pattern: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown dtype `{0}`")]
pub struct UnknownDtype(pub String);

/// Raised while reading a declarative schema file.
#[derive(Error, Debug)]
pub enum DeclError {
    #[error("at JSON path {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}
