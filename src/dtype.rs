//! Value kinds an argument may accept, and type reconciliation.
//!
//! A node's declared kinds are folded together with whatever its structure
//! implies (sub-fields mean `dict`, repeated sub-fields mean `list`, a default
//! value means its own kind) into one canonical set that can be tested
//! directly against any payload value.
use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UnknownDtype;

/// Canonical, deduplicated set of accepted kinds (declaration order kept).
pub type Dtypes = IndexSet<Dtype>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Dtype {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    /// List whose every element must match the inner kind.
    ListOf(Box<Dtype>),
    Dict,
    /// Unconstrained.
    Any,
}

impl Dtype {
    /// Runtime kind of a payload value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Dtype::Null,
            Value::Bool(_) => Dtype::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => Dtype::Int,
            Value::Number(_) => Dtype::Float,
            Value::String(_) => Dtype::Str,
            Value::Array(_) => Dtype::List,
            Value::Object(_) => Dtype::Dict,
        }
    }

    pub fn list_of(inner: Dtype) -> Self {
        Dtype::ListOf(Box::new(inner))
    }

    /// Membership test. An integer is a valid float; a boolean is not an integer.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Dtype::Any, _) => true,
            (Dtype::Null, Value::Null) => true,
            (Dtype::Bool, Value::Bool(_)) => true,
            (Dtype::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Dtype::Float, Value::Number(_)) => true,
            (Dtype::Str, Value::String(_)) => true,
            (Dtype::List, Value::Array(_)) => true,
            (Dtype::ListOf(inner), Value::Array(xs)) => xs.iter().all(|x| inner.matches(x)),
            (Dtype::Dict, Value::Object(_)) => true,
            _ => false,
        }
    }
}

// ------------------------------ Reconcile --------------------------------- //

/// Fold structural implications into the declared kinds.
///
/// `default` is only consulted for optional nodes; pass `None` otherwise.
pub fn reconcile(
    declared: &[Dtype],
    repeat: bool,
    has_sub: bool,
    default: Option<&Value>,
) -> Dtypes {
    let mut out: Dtypes = declared.iter().cloned().collect();
    if has_sub {
        out.insert(if repeat { Dtype::List } else { Dtype::Dict });
    }
    if let Some(default) = default {
        if !out.iter().any(|t| t.matches(default)) {
            out.insert(Dtype::of(default));
        }
    }
    if out.is_empty() {
        out.insert(Dtype::Any);
    }
    out
}

pub fn accepts(dtypes: &Dtypes, value: &Value) -> bool {
    dtypes.iter().any(|t| t.matches(value))
}

/// `int | str | dict`
pub fn describe(dtypes: &Dtypes) -> String {
    dtypes.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" | ")
}

// ------------------------------ Text form --------------------------------- //

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::Null => f.write_str("null"),
            Dtype::Bool => f.write_str("bool"),
            Dtype::Int => f.write_str("int"),
            Dtype::Float => f.write_str("float"),
            Dtype::Str => f.write_str("str"),
            Dtype::List => f.write_str("list"),
            Dtype::ListOf(inner) => write!(f, "list[{inner}]"),
            Dtype::Dict => f.write_str("dict"),
            Dtype::Any => f.write_str("any"),
        }
    }
}

impl FromStr for Dtype {
    type Err = UnknownDtype;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix("list[").and_then(|rest| rest.strip_suffix(']')) {
            return Ok(Dtype::list_of(inner.parse()?));
        }
        match s {
            "null" | "none" | "NoneType" => Ok(Dtype::Null),
            "bool" | "boolean" => Ok(Dtype::Bool),
            "int" | "integer" => Ok(Dtype::Int),
            "float" | "number" => Ok(Dtype::Float),
            "str" | "string" => Ok(Dtype::Str),
            "list" | "array" => Ok(Dtype::List),
            "dict" | "object" => Ok(Dtype::Dict),
            "any" => Ok(Dtype::Any),
            other => Err(UnknownDtype(other.to_string())),
        }
    }
}

impl TryFrom<String> for Dtype {
    type Error = UnknownDtype;
    fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<Dtype> for String {
    fn from(t: Dtype) -> Self { t.to_string() }
}

// ------------------------------- Tests ------------------------------------ //
