//! Declarative schema files.
//!
//! A schema is written as nested JSON:
//!
//! ```json
//! { "name": "base", "dtype": "dict",
//!   "sub_fields": [ { "name": "sub1", "dtype": ["int", "null"], "optional": true, "default": null } ],
//!   "sub_variants": [ { "flag_name": "kind", "default_tag": "a",
//!                       "choices": [ { "name": "a", "sub_fields": [] } ] } ] }
//! ```
//!
//! `dtype` takes one name or a list. An explicit `"default": null` is a real
//! null default; leaving `default` out means there is none.
use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dtype::Dtype;
use crate::error::{DeclError, SchemaError};
use crate::schema::{ArgId, ArgRef, Argument, Schema, Variant, VariantId, VariantRef};

// ————————————————————————————————————————————————————————————————————————————
// DATA MODEL
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArgumentDecl {
    pub name: String,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub dtype: Vec<Dtype>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_fields: Vec<ArgumentDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_variants: Vec<VariantDecl>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub repeat: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alias: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantDecl {
    pub flag_name: String,
    #[serde(default)]
    pub choices: Vec<ArgumentDecl>,
    /// Implied by `default_tag` when left out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_tag: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A present key is always `Some`, even when it holds `null`.
fn present<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(de).map(Some)
}

fn one_or_many<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<Dtype>, D::Error> {
    struct OneOrMany;

    impl<'de> Visitor<'de> for OneOrMany {
        type Value = Vec<Dtype>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a dtype name or a list of dtype names")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            v.parse().map(|t| vec![t]).map_err(E::custom)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(vec![Dtype::Null])
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::new();
            while let Some(t) = seq.next_element::<Dtype>()? {
                out.push(t);
            }
            Ok(out)
        }
    }

    de.deserialize_any(OneOrMany)
}

// ————————————————————————————————————————————————————————————————————————————
// LOADING
// ————————————————————————————————————————————————————————————————————————————

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, DeclError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize(de).map_err(|err| DeclError::Parse {
        path: err.path().to_string(),
        source: err.into_inner(),
    })
}

/// Parse a schema file and build it into a fresh arena.
pub fn load_str(src: &str) -> Result<(Schema, ArgId), DeclError> {
    let decl: ArgumentDecl = from_str_with_path(src)?;
    let mut schema = Schema::new();
    let root = schema.load(&decl)?;
    Ok((schema, root))
}

impl Schema {
    /// Build a declaration tree bottom-up. Nothing is added on error.
    pub fn load(&mut self, decl: &ArgumentDecl) -> Result<ArgId, SchemaError> {
        let mark = self.mark();
        self.load_argument(decl).inspect_err(|_| self.rollback(mark))
    }

    fn load_argument(&mut self, decl: &ArgumentDecl) -> Result<ArgId, SchemaError> {
        let sub_fields = decl.sub_fields.iter().map(|d| self.load_argument(d)).collect::<Result<Vec<_>, _>>()?;
        let sub_variants = decl.sub_variants.iter().map(|d| self.load_variant(d)).collect::<Result<Vec<_>, _>>()?;
        let mut argument = Argument::new(decl.name.clone(), decl.dtype.iter().cloned())
            .sub_fields(sub_fields)
            .sub_variants(sub_variants)
            .repeat(decl.repeat)
            .optional(decl.optional)
            .alias(decl.alias.iter().cloned())
            .doc(decl.doc.clone());
        argument.default = decl.default.clone();
        self.add_argument(argument)
    }

    fn load_variant(&mut self, decl: &VariantDecl) -> Result<VariantId, SchemaError> {
        let choices = decl.choices.iter().map(|d| self.load_argument(d)).collect::<Result<Vec<_>, _>>()?;
        let mut variant = Variant::new(decl.flag_name.clone()).choices(choices).doc(decl.doc.clone());
        variant.optional = decl.optional.unwrap_or(decl.default_tag.is_some());
        variant.default_tag = decl.default_tag.clone();
        self.add_variant(variant)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ENCODING
// ————————————————————————————————————————————————————————————————————————————

impl ArgRef<'_> {
    /// Declaration that loads back into an equal tree. Extra checks are code
    /// and cannot be written out.
    pub fn to_decl(&self) -> ArgumentDecl {
        ArgumentDecl {
            name: self.name().to_string(),
            dtype: self.declared_dtype().to_vec(),
            sub_fields: self.sub_fields().map(|f| f.to_decl()).collect(),
            sub_variants: self.sub_variants().map(|v| v.to_decl()).collect(),
            repeat: self.repeat(),
            optional: self.optional(),
            default: self.default().cloned(),
            alias: self.alias().to_vec(),
            doc: self.doc().to_string(),
        }
    }
}

impl VariantRef<'_> {
    pub fn to_decl(&self) -> VariantDecl {
        VariantDecl {
            flag_name: self.flag_name().to_string(),
            choices: self.choices().map(|c| c.to_decl()).collect(),
            optional: Some(self.optional()),
            default_tag: self.default_tag().map(str::to_string),
            doc: self.doc().to_string(),
        }
    }
}
