//! Read-only view of a tagged union.
//!
//! One payload value (the flag) picks an entire choice; the choice may itself
//! declare further variants, so "which keys are legal here" is answered by
//! asking the resolved choice for its own flattened fields.
use std::fmt;
use std::ptr;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::argument::{merge_nodup, FlatFields};
use super::{ArgRef, Schema, VariantId, VariantNode};
use crate::error::ArgumentError;
use crate::suggest;

#[derive(Clone, Copy)]
pub struct VariantRef<'a> {
    schema: &'a Schema,
    id: VariantId,
}

impl<'a> VariantRef<'a> {
    pub(crate) fn new(schema: &'a Schema, id: VariantId) -> Self {
        Self { schema, id }
    }

    fn node(&self) -> &'a VariantNode {
        self.schema.variant_node(self.id)
    }

    pub fn id(&self) -> VariantId { self.id }
    pub fn flag_name(&self) -> &'a str { &self.node().flag_name }
    pub fn optional(&self) -> bool { self.node().optional }
    pub fn default_tag(&self) -> Option<&'a str> { self.node().default_tag.as_deref() }
    pub fn doc(&self) -> &'a str { &self.node().doc }

    /// alternate tag -> canonical tag
    pub fn choice_alias(&self) -> &'a IndexMap<String, String> { &self.node().choice_alias }

    pub fn choices(&self) -> impl ExactSizeIterator<Item = ArgRef<'a>> + use<'a> {
        let schema = self.schema;
        self.node().choice_dict.values().map(move |&id| ArgRef::new(schema, id))
    }

    /// Choice registered under the canonical `tag`.
    pub fn choice(&self, tag: &str) -> Option<ArgRef<'a>> {
        self.node().choice_dict.get(tag).map(|&id| ArgRef::new(self.schema, id))
    }

    /// Canonical tag or alias.
    pub fn resolve_tag(&self, tag: &str) -> Option<ArgRef<'a>> {
        self.choice(tag).or_else(|| {
            let canonical = self.node().choice_alias.get(tag)?;
            self.choice(canonical)
        })
    }

    /// The `str` argument standing for the flag key itself.
    pub fn flag_argument(&self) -> ArgRef<'a> {
        ArgRef::new(self.schema, self.node().flag_arg)
    }

    pub fn get_choice(&self, map: &Map<String, Value>) -> Result<ArgRef<'a>, ArgumentError> {
        self.get_choice_at(map, &[])
    }

    pub(crate) fn get_choice_at(
        &self,
        map: &Map<String, Value>,
        path: &[String],
    ) -> Result<ArgRef<'a>, ArgumentError> {
        let flag = self.flag_name();
        match map.get(flag) {
            Some(value) => {
                let found = value.as_str().and_then(|tag| self.resolve_tag(tag));
                found.ok_or_else(|| self.invalid_tag(value, path))
            }
            None => match self.default_tag().and_then(|tag| self.choice(tag)) {
                Some(choice) if self.optional() => Ok(choice),
                _ => Err(ArgumentError::key(
                    path,
                    format!("key `{flag}` is required to choose variant but not found"),
                )),
            },
        }
    }

    fn invalid_tag(&self, value: &Value, path: &[String]) -> ArgumentError {
        let tag = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let flag = self.flag_name();
        let mut message = format!("get invalid choice `{tag}` for flag `{flag}`.");
        let candidates = self.node().choice_dict.keys().chain(self.node().choice_alias.keys());
        if let Some(hint) = suggest::did_you_mean(&tag, candidates.map(String::as_str)) {
            message.push_str(&format!(" Did you mean: {hint}?"));
        }
        let mut at = path.to_vec();
        at.push(flag.to_string());
        ArgumentError::value(&at, message)
    }

    /// Flag placeholder plus the resolved choice's own flattened fields.
    pub fn flatten_sub(&self, map: &Map<String, Value>) -> Result<FlatFields<'a>, ArgumentError> {
        self.flatten_sub_at(map, &[])
    }

    pub(crate) fn flatten_sub_at(
        &self,
        map: &Map<String, Value>,
        path: &[String],
    ) -> Result<FlatFields<'a>, ArgumentError> {
        let choice = self.get_choice_at(map, path)?;
        let mut flat = FlatFields::new();
        flat.insert(self.flag_name(), self.flag_argument());
        merge_nodup(&mut flat, choice.flatten_sub_at(map, path)?, choice.name(), path)?;
        Ok(flat)
    }
}

/// Doc is ignored; choices compare structurally.
impl PartialEq for VariantRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        if ptr::eq(self.schema, other.schema) && self.id == other.id {
            return true;
        }
        let (a, b) = (self.node(), other.node());
        a.flag_name == b.flag_name
            && a.optional == b.optional
            && a.default_tag == b.default_tag
            && a.choice_dict.len() == b.choice_dict.len()
            && self.choices().all(|c| other.choice(c.name()) == Some(c))
    }
}

impl fmt::Debug for VariantRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.node().choice_dict.keys().map(String::as_str).collect();
        write!(f, "<Variant {} in {{ {} }}>", self.flag_name(), tags.join(", "))
    }
}
