//! Declarative validation and normalization of nested JSON arguments.
//!
//! A [`Schema`] is an arena of argument nodes and variant nodes. Build one
//! with the builder API or load it from a declaration file ([`decl`]), then
//! walk payloads through an [`ArgRef`]:
//!
//! ```
//! use json_args::{Argument, Dtype, Schema};
//! use serde_json::json;
//!
//! let mut schema = Schema::new();
//! let port = schema.add_argument(Argument::new("port", [Dtype::Int]).optional(true).with_default(8080)).unwrap();
//! let root = schema.add_argument(Argument::new("server", [Dtype::Dict]).sub_fields([port])).unwrap();
//!
//! let out = schema.arg(root).normalize_value(&json!({}), &Default::default()).unwrap();
//! assert_eq!(out, json!({"port": 8080}));
//! schema.arg(root).check_value(&out, true).unwrap();
//! ```
pub mod annotate;
pub mod decl;
pub mod doc;
pub mod dtype;
pub mod error;
pub mod jq_exec;
pub mod json_schema;
pub mod path;
pub mod schema;
pub mod suggest;
pub mod traverse;

pub use doc::DocOptions;
pub use dtype::{Dtype, Dtypes};
pub use error::{ArgumentError, DeclError, ErrorKind, LookupError, NormalizeError, PatternError, SchemaError};
pub use json_schema::generate_json_schema;
pub use schema::{ArgId, ArgRef, Argument, Schema, Variant, VariantId, VariantRef};
pub use traverse::{NormalizeOptions, TrimPattern};
