//! Read-only view of an argument node.
use std::fmt;
use std::ptr;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::{ArgId, ArgNode, Predicate, Schema, VariantRef};
use crate::dtype::{self, Dtype, Dtypes};
use crate::error::ArgumentError;

/// Payload keys legal at one mapping level, each with the node governing it.
pub type FlatFields<'a> = IndexMap<&'a str, ArgRef<'a>>;

#[derive(Clone, Copy)]
pub struct ArgRef<'a> {
    schema: &'a Schema,
    id: ArgId,
}

impl<'a> ArgRef<'a> {
    pub(crate) fn new(schema: &'a Schema, id: ArgId) -> Self {
        Self { schema, id }
    }

    fn node(&self) -> &'a ArgNode {
        self.schema.arg_node(self.id)
    }

    pub fn id(&self) -> ArgId { self.id }
    pub fn schema(&self) -> &'a Schema { self.schema }
    pub fn name(&self) -> &'a str { &self.node().name }
    pub fn dtype(&self) -> &'a Dtypes { &self.node().dtype }
    pub fn repeat(&self) -> bool { self.node().repeat }
    pub fn optional(&self) -> bool { self.node().optional }
    pub fn default(&self) -> Option<&'a Value> { self.node().default.as_ref() }
    pub fn alias(&self) -> &'a [String] { &self.node().alias }
    pub fn extra_check(&self) -> Option<&'a Predicate> { self.node().extra_check.as_ref() }
    pub fn doc(&self) -> &'a str { &self.node().doc }

    /// Kinds as declared, before reconciliation.
    pub fn declared_dtype(&self) -> &'a [Dtype] { &self.node().declared }

    pub fn sub_fields(&self) -> impl ExactSizeIterator<Item = ArgRef<'a>> + use<'a> {
        let schema = self.schema;
        self.node().sub_fields.values().map(move |&id| ArgRef::new(schema, id))
    }

    pub fn sub_field(&self, name: &str) -> Option<ArgRef<'a>> {
        self.node().sub_fields.get(name).map(|&id| ArgRef::new(self.schema, id))
    }

    pub fn sub_variants(&self) -> impl ExactSizeIterator<Item = VariantRef<'a>> + use<'a> {
        let schema = self.schema;
        self.node().sub_variants.values().map(move |&id| VariantRef::new(schema, id))
    }

    pub fn sub_variant(&self, flag_name: &str) -> Option<VariantRef<'a>> {
        self.node().sub_variants.get(flag_name).map(|&id| VariantRef::new(self.schema, id))
    }

    pub fn has_sub(&self) -> bool {
        !self.node().sub_fields.is_empty() || !self.node().sub_variants.is_empty()
    }

    pub fn accepts(&self, value: &Value) -> bool {
        dtype::accepts(self.dtype(), value)
    }

    /// Own sub-fields plus, for every sub-variant, its flag placeholder and
    /// the fields of the choice `map` currently selects (recursively).
    pub fn flatten_sub(&self, map: &Map<String, Value>) -> Result<FlatFields<'a>, ArgumentError> {
        self.flatten_sub_at(map, &[])
    }

    pub(crate) fn flatten_sub_at(
        &self,
        map: &Map<String, Value>,
        path: &[String],
    ) -> Result<FlatFields<'a>, ArgumentError> {
        let mut flat: FlatFields<'a> = self.sub_fields().map(|f| (f.name(), f)).collect();
        for variant in self.sub_variants() {
            let more = variant.flatten_sub_at(map, path)?;
            merge_nodup(&mut flat, more, self.name(), path)?;
        }
        Ok(flat)
    }
}

pub(crate) fn merge_nodup<'a>(
    into: &mut FlatFields<'a>,
    from: FlatFields<'a>,
    owner: &str,
    path: &[String],
) -> Result<(), ArgumentError> {
    for (key, arg) in from {
        if into.contains_key(key) {
            return Err(ArgumentError::key(
                path,
                format!("duplicate key `{key}` when flattening variants of `{owner}`"),
            ));
        }
        into.insert(key, arg);
    }
    Ok(())
}

/// Structural equality: doc and default do not take part.
impl PartialEq for ArgRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        if ptr::eq(self.schema, other.schema) && self.id == other.id {
            return true;
        }
        let (a, b) = (self.node(), other.node());
        a.name == b.name
            && a.dtype == b.dtype
            && a.repeat == b.repeat
            && a.optional == b.optional
            && a.sub_fields.len() == b.sub_fields.len()
            && self.sub_fields().all(|f| other.sub_field(f.name()) == Some(f))
            && a.sub_variants.len() == b.sub_variants.len()
            && self.sub_variants().all(|v| other.sub_variant(v.flag_name()) == Some(v))
    }
}

impl fmt::Debug for ArgRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Argument {}: {}>", self.name(), dtype::describe(self.dtype()))
    }
}
