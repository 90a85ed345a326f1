//! Schema arena.
//!
//! Argument and variant nodes live in one [`Schema`] and point at each other
//! by id. Children are built before the parents that list them, so a fresh
//! tree is acyclic by construction; re-attaching an existing node (sharing a
//! sub-tree between parents) is allowed and is rejected only when it would
//! close a cycle.
//!
//! Every structural change re-runs type reconciliation on the touched node.
pub mod argument;
pub mod variant;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use crate::dtype::{self, Dtype, Dtypes};
use crate::error::SchemaError;

pub use argument::ArgRef;
pub use variant::VariantRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantId(usize);

/// Side-effect-free predicate run after a value passed its type check.
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>);

impl Predicate {
    pub fn new(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
    pub fn call(&self, value: &Value) -> bool {
        (self.0)(value)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DECLARATIONS
// ————————————————————————————————————————————————————————————————————————————

/// Declaration of an argument node, consumed by [`Schema::add_argument`].
#[derive(Clone, Debug)]
pub struct Argument {
    pub name: String,
    pub dtype: Vec<Dtype>,
    pub sub_fields: Vec<ArgId>,
    pub sub_variants: Vec<VariantId>,
    pub repeat: bool,
    pub optional: bool,
    /// `None` is "no default"; `Some(Value::Null)` is a real null default.
    pub default: Option<Value>,
    pub alias: Vec<String>,
    pub extra_check: Option<Predicate>,
    pub doc: String,
}

impl Argument {
    pub fn new(name: impl Into<String>, dtype: impl IntoIterator<Item = Dtype>) -> Self {
        Self {
            name: name.into(),
            dtype: dtype.into_iter().collect(),
            sub_fields: Vec::new(),
            sub_variants: Vec::new(),
            repeat: false,
            optional: false,
            default: None,
            alias: Vec::new(),
            extra_check: None,
            doc: String::new(),
        }
    }
    pub fn sub_fields(mut self, ids: impl IntoIterator<Item = ArgId>) -> Self {
        self.sub_fields.extend(ids);
        self
    }
    pub fn sub_variants(mut self, ids: impl IntoIterator<Item = VariantId>) -> Self {
        self.sub_variants.extend(ids);
        self
    }
    pub fn repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
    pub fn alias<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.alias.extend(names.into_iter().map(Into::into));
        self
    }
    pub fn extra_check(mut self, f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.extra_check = Some(Predicate::new(f));
        self
    }
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }
}

/// Declaration of a tagged union, consumed by [`Schema::add_variant`].
#[derive(Clone, Debug)]
pub struct Variant {
    pub flag_name: String,
    pub choices: Vec<ArgId>,
    pub optional: bool,
    pub default_tag: Option<String>,
    pub doc: String,
}

impl Variant {
    pub fn new(flag_name: impl Into<String>) -> Self {
        Self {
            flag_name: flag_name.into(),
            choices: Vec::new(),
            optional: false,
            default_tag: None,
            doc: String::new(),
        }
    }
    pub fn choices(mut self, ids: impl IntoIterator<Item = ArgId>) -> Self {
        self.choices.extend(ids);
        self
    }
    /// Makes the flag optional, falling back to `tag` when absent.
    pub fn default_tag(mut self, tag: impl Into<String>) -> Self {
        self.optional = true;
        self.default_tag = Some(tag.into());
        self
    }
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }
}

// ————————————————————————————————————————————————————————————————————————————
// STORED NODES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone, Debug)]
pub(crate) struct ArgNode {
    pub(crate) name: String,
    pub(crate) declared: Vec<Dtype>,
    pub(crate) dtype: Dtypes,
    pub(crate) sub_fields: IndexMap<String, ArgId>,
    pub(crate) sub_variants: IndexMap<String, VariantId>,
    pub(crate) repeat: bool,
    pub(crate) optional: bool,
    pub(crate) default: Option<Value>,
    pub(crate) alias: Vec<String>,
    pub(crate) extra_check: Option<Predicate>,
    pub(crate) doc: String,
}

impl ArgNode {
    fn reorg_dtype(&mut self) {
        let has_sub = !self.sub_fields.is_empty() || !self.sub_variants.is_empty();
        let default = if self.optional { self.default.as_ref() } else { None };
        self.dtype = dtype::reconcile(&self.declared, self.repeat, has_sub, default);
    }
}

#[derive(Clone, Debug)]
pub(crate) struct VariantNode {
    pub(crate) flag_name: String,
    pub(crate) choice_dict: IndexMap<String, ArgId>,
    pub(crate) choice_alias: IndexMap<String, String>,
    pub(crate) optional: bool,
    pub(crate) default_tag: Option<String>,
    pub(crate) doc: String,
    /// `str` placeholder standing for the flag key when flattening.
    pub(crate) flag_arg: ArgId,
}

// ————————————————————————————————————————————————————————————————————————————
// ARENA
// ————————————————————————————————————————————————————————————————————————————

/// Owns every node of one or more schema trees.
///
/// Ids are only meaningful for the schema that issued them; passing a foreign
/// id panics like any out-of-bounds index.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    args: Vec<ArgNode>,
    variants: Vec<VariantNode>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(&self, id: ArgId) -> ArgRef<'_> {
        ArgRef::new(self, id)
    }

    pub fn variant(&self, id: VariantId) -> VariantRef<'_> {
        VariantRef::new(self, id)
    }

    pub(crate) fn arg_node(&self, id: ArgId) -> &ArgNode {
        &self.args[id.0]
    }

    pub(crate) fn variant_node(&self, id: VariantId) -> &VariantNode {
        &self.variants[id.0]
    }

    // ---------------------------- construction ---------------------------- //

    /// Build a standalone argument node from already-built children.
    pub fn add_argument(&mut self, decl: Argument) -> Result<ArgId, SchemaError> {
        let context = format!("argument `{}`", decl.name);
        let mut sub_fields = IndexMap::new();
        for id in decl.sub_fields {
            let name = self.arg_node(id).name.clone();
            insert_nodup(&mut sub_fields, name, id, &[], &context)?;
        }
        let mut sub_variants = IndexMap::new();
        for id in decl.sub_variants {
            let flag = self.variant_node(id).flag_name.clone();
            let taken: Vec<&str> = sub_fields.keys().map(String::as_str).collect();
            insert_nodup(&mut sub_variants, flag, id, &taken, &context)?;
        }
        let mut node = ArgNode {
            name: decl.name,
            declared: decl.dtype,
            dtype: IndexSet::new(),
            sub_fields,
            sub_variants,
            repeat: decl.repeat,
            optional: decl.optional,
            default: decl.default,
            alias: decl.alias,
            extra_check: decl.extra_check,
            doc: decl.doc,
        };
        node.reorg_dtype();
        Ok(self.push_arg(node))
    }

    /// Build a standalone variant node from already-built choices.
    pub fn add_variant(&mut self, decl: Variant) -> Result<VariantId, SchemaError> {
        let mut choice_dict = IndexMap::new();
        let mut choice_alias = IndexMap::new();
        self.merge_choices(&decl.flag_name, &mut choice_dict, &mut choice_alias, &decl.choices)?;
        let default_tag = match (decl.optional, decl.default_tag) {
            (false, _) => None,
            (true, None) => return Err(SchemaError::MissingDefaultTag { flag: decl.flag_name }),
            (true, Some(tag)) if tag.is_empty() => {
                return Err(SchemaError::MissingDefaultTag { flag: decl.flag_name });
            }
            (true, Some(tag)) if !choice_dict.contains_key(&tag) => {
                return Err(SchemaError::InvalidDefaultTag { flag: decl.flag_name, tag });
            }
            (true, Some(tag)) => Some(tag),
        };
        let flag_arg = self.push_arg(flag_placeholder(&decl.flag_name, default_tag.as_deref()));
        self.variants.push(VariantNode {
            flag_name: decl.flag_name,
            choice_dict,
            choice_alias,
            optional: default_tag.is_some(),
            default_tag,
            doc: decl.doc,
            flag_arg,
        });
        Ok(VariantId(self.variants.len() - 1))
    }

    /// Synthetic `dict` node named `_` holding `root` as its only field, so
    /// paths can start with the root's own name (`base[type1]/shared`).
    pub fn wrap(&mut self, root: ArgId) -> ArgId {
        let mut node = ArgNode {
            name: "_".to_string(),
            declared: vec![Dtype::Dict],
            dtype: IndexSet::new(),
            sub_fields: IndexMap::from([(self.arg_node(root).name.clone(), root)]),
            sub_variants: IndexMap::new(),
            repeat: false,
            optional: false,
            default: None,
            alias: Vec::new(),
            extra_check: None,
            doc: String::new(),
        };
        node.reorg_dtype();
        self.push_arg(node)
    }

    // ------------------------------ mutators ------------------------------ //

    pub fn set_dtype(&mut self, id: ArgId, dtype: impl IntoIterator<Item = Dtype>) {
        let node = &mut self.args[id.0];
        node.declared = dtype.into_iter().collect();
        node.reorg_dtype();
    }

    pub fn set_repeat(&mut self, id: ArgId, repeat: bool) {
        let node = &mut self.args[id.0];
        node.repeat = repeat;
        node.reorg_dtype();
    }

    /// Build `decl` and append it as a sub-field of `parent`.
    pub fn add_subfield(&mut self, parent: ArgId, decl: Argument) -> Result<ArgId, SchemaError> {
        let mark = self.mark();
        let id = self.add_argument(decl)?;
        self.attach_subfield(parent, id).inspect_err(|_| self.rollback(mark))?;
        Ok(id)
    }

    /// Append an existing node as a sub-field of `parent`.
    pub fn attach_subfield(&mut self, parent: ArgId, child: ArgId) -> Result<(), SchemaError> {
        if child == parent || self.reachable_from(child).0.contains(&parent) {
            return Err(self.cycle(parent, &self.arg_node(child).name));
        }
        let name = self.arg_node(child).name.clone();
        let node = &mut self.args[parent.0];
        let context = format!("argument `{}`", node.name);
        if node.sub_fields.contains_key(&name) || node.sub_variants.contains_key(&name) {
            return Err(SchemaError::Duplicate { key: name, context });
        }
        node.sub_fields.insert(name, child);
        node.reorg_dtype();
        Ok(())
    }

    /// Build `decl` and append it as a sub-variant of `parent`.
    pub fn add_subvariant(&mut self, parent: ArgId, decl: Variant) -> Result<VariantId, SchemaError> {
        let mark = self.mark();
        let id = self.add_variant(decl)?;
        self.attach_subvariant(parent, id).inspect_err(|_| self.rollback(mark))?;
        Ok(id)
    }

    /// Append an existing variant as a sub-variant of `parent`.
    pub fn attach_subvariant(&mut self, parent: ArgId, variant: VariantId) -> Result<(), SchemaError> {
        let vnode = self.variant_node(variant);
        let closes_cycle = vnode
            .choice_dict
            .values()
            .any(|&choice| choice == parent || self.reachable_from(choice).0.contains(&parent));
        if closes_cycle {
            return Err(self.cycle(parent, &vnode.flag_name));
        }
        let flag = vnode.flag_name.clone();
        let node = &mut self.args[parent.0];
        let context = format!("argument `{}`", node.name);
        let taken: Vec<&str> = node.sub_fields.keys().map(String::as_str).collect();
        insert_nodup(&mut node.sub_variants, flag, variant, &taken, &context)?;
        node.reorg_dtype();
        Ok(())
    }

    /// Build `decl` and register it as a choice of `variant`; its name is the tag.
    pub fn add_choice(&mut self, variant: VariantId, decl: Argument) -> Result<ArgId, SchemaError> {
        let mark = self.mark();
        let id = self.add_argument(decl)?;
        self.extend_choices(variant, [id]).inspect_err(|_| self.rollback(mark))?;
        Ok(id)
    }

    pub fn attach_choice(&mut self, variant: VariantId, choice: ArgId) -> Result<(), SchemaError> {
        self.extend_choices(variant, [choice])
    }

    /// Register several choices at once; nothing is registered on error.
    pub fn extend_choices(
        &mut self,
        variant: VariantId,
        choices: impl IntoIterator<Item = ArgId>,
    ) -> Result<(), SchemaError> {
        let choices: Vec<ArgId> = choices.into_iter().collect();
        let vnode = self.variant_node(variant);
        if let Some(&bad) = choices.iter().find(|&&c| self.reachable_from(c).1.contains(&variant)) {
            return Err(self.cycle_variant(variant, &self.arg_node(bad).name));
        }
        let mut choice_dict = vnode.choice_dict.clone();
        let mut choice_alias = vnode.choice_alias.clone();
        let flag = vnode.flag_name.clone();
        self.merge_choices(&flag, &mut choice_dict, &mut choice_alias, &choices)?;
        let vnode = &mut self.variants[variant.0];
        vnode.choice_dict = choice_dict;
        vnode.choice_alias = choice_alias;
        Ok(())
    }

    /// `Some(tag)` makes the flag optional with that fallback; `None` makes it
    /// required again and clears the default.
    pub fn set_default(&mut self, variant: VariantId, tag: Option<&str>) -> Result<(), SchemaError> {
        let vnode = &mut self.variants[variant.0];
        match tag.filter(|t| !t.is_empty()) {
            None => {
                vnode.optional = false;
                vnode.default_tag = None;
            }
            Some(tag) if !vnode.choice_dict.contains_key(tag) => {
                return Err(SchemaError::InvalidDefaultTag {
                    flag: vnode.flag_name.clone(),
                    tag: tag.to_string(),
                });
            }
            Some(tag) => {
                vnode.optional = true;
                vnode.default_tag = Some(tag.to_string());
            }
        }
        let placeholder = flag_placeholder(&vnode.flag_name, vnode.default_tag.as_deref());
        let flag_arg = vnode.flag_arg;
        self.args[flag_arg.0] = placeholder;
        Ok(())
    }

    // ------------------------------ helpers ------------------------------- //

    fn push_arg(&mut self, node: ArgNode) -> ArgId {
        self.args.push(node);
        ArgId(self.args.len() - 1)
    }

    pub(crate) fn mark(&self) -> (usize, usize) {
        (self.args.len(), self.variants.len())
    }

    pub(crate) fn rollback(&mut self, (args, variants): (usize, usize)) {
        self.args.truncate(args);
        self.variants.truncate(variants);
    }

    fn merge_choices(
        &self,
        flag: &str,
        choice_dict: &mut IndexMap<String, ArgId>,
        choice_alias: &mut IndexMap<String, String>,
        choices: &[ArgId],
    ) -> Result<(), SchemaError> {
        let context = format!("variant with flag `{flag}`");
        for &id in choices {
            let name = self.arg_node(id).name.clone();
            let mut taken: Vec<&str> = choice_alias.keys().map(String::as_str).collect();
            taken.push(flag);
            insert_nodup(choice_dict, name, id, &taken, &context)?;
        }
        let alias_context = format!("alias table of variant with flag `{flag}`");
        for &id in choices {
            let node = self.arg_node(id);
            for alias in &node.alias {
                let mut taken: Vec<&str> = choice_dict.keys().map(String::as_str).collect();
                taken.push(flag);
                insert_nodup(choice_alias, alias.clone(), node.name.clone(), &taken, &alias_context)?;
            }
        }
        Ok(())
    }

    /// Every argument and variant reachable below `from` (excluding `from`).
    fn reachable_from(&self, from: ArgId) -> (HashSet<ArgId>, HashSet<VariantId>) {
        let mut args = HashSet::new();
        let mut variants = HashSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let node = self.arg_node(id);
            for &child in node.sub_fields.values() {
                if args.insert(child) {
                    stack.push(child);
                }
            }
            for &vid in node.sub_variants.values() {
                if variants.insert(vid) {
                    for &choice in self.variant_node(vid).choice_dict.values() {
                        if args.insert(choice) {
                            stack.push(choice);
                        }
                    }
                }
            }
        }
        (args, variants)
    }

    fn cycle(&self, parent: ArgId, child: &str) -> SchemaError {
        SchemaError::Cycle { parent: self.arg_node(parent).name.clone(), child: child.to_string() }
    }

    fn cycle_variant(&self, variant: VariantId, child: &str) -> SchemaError {
        SchemaError::Cycle { parent: self.variant_node(variant).flag_name.clone(), child: child.to_string() }
    }
}

fn flag_placeholder(flag: &str, default_tag: Option<&str>) -> ArgNode {
    let mut node = ArgNode {
        name: flag.to_string(),
        declared: vec![Dtype::Str],
        dtype: IndexSet::new(),
        sub_fields: IndexMap::new(),
        sub_variants: IndexMap::new(),
        repeat: false,
        optional: default_tag.is_some(),
        default: default_tag.map(|t| Value::String(t.to_string())),
        alias: Vec::new(),
        extra_check: None,
        doc: format!("flag key of variant `{flag}`"),
    };
    node.reorg_dtype();
    node
}

fn insert_nodup<V>(
    map: &mut IndexMap<String, V>,
    key: String,
    value: V,
    exclude: &[&str],
    context: &str,
) -> Result<(), SchemaError> {
    if map.contains_key(&key) || exclude.contains(&key.as_str()) {
        return Err(SchemaError::Duplicate { key, context: context.to_string() });
    }
    map.insert(key, value);
    Ok(())
}

// ------------------------------- Tests ------------------------------------ //
