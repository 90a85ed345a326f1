//! The one recursive walk over (schema node, payload) pairs.
//!
//! Checking and normalization are nothing but different [`Hooks`]
//! implementations driven through [`traverse`] / [`traverse_value`]:
//!
//! - `key`     every field node, before its value is looked up
//! - `value`   once the field's value exists
//! - `sub`     every mapping (or repeated element) the node governs
//! - `variant` every sub-variant of that mapping, before flattening
//!
//! The legal field set is flattened afresh at every mapping level, since the
//! variant choices in effect depend on that mapping's own flag values.
pub mod check;
pub mod normalize;

use serde_json::{Map, Value};

use crate::error::ArgumentError;
use crate::schema::{ArgRef, VariantRef};

pub use normalize::{NormalizeOptions, TrimPattern};

/// Callbacks injected into the walk. Every hook defaults to a no-op.
#[allow(unused_variables)]
pub trait Hooks {
    type Error: From<ArgumentError>;

    fn key(&mut self, arg: ArgRef<'_>, map: &mut Map<String, Value>, path: &[String]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn value(&mut self, arg: ArgRef<'_>, value: &Value, path: &[String]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn sub(&mut self, arg: ArgRef<'_>, map: &mut Map<String, Value>, path: &[String]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn variant(&mut self, variant: VariantRef<'_>, map: &mut Map<String, Value>, path: &[String]) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Visit `arg` as a key of `map`, then descend into its value if present.
pub fn traverse<H: Hooks>(
    arg: ArgRef<'_>,
    map: &mut Map<String, Value>,
    path: &mut Vec<String>,
    hooks: &mut H,
) -> Result<(), H::Error> {
    hooks.key(arg, map, path)?;
    if let Some(value) = map.get_mut(arg.name()) {
        path.push(arg.name().to_string());
        traverse_value(arg, value, path, hooks)?;
        path.pop();
    }
    Ok(())
}

/// Visit a value governed by `arg` with no leading key; `path` already ends
/// at the value.
pub fn traverse_value<H: Hooks>(
    arg: ArgRef<'_>,
    value: &mut Value,
    path: &mut Vec<String>,
    hooks: &mut H,
) -> Result<(), H::Error> {
    tracing::trace!(node = arg.name(), path = %path.join("/"), "visit");
    hooks.value(arg, value, path)?;
    match value {
        Value::Object(items) if arg.repeat() => {
            for (key, item) in items.iter_mut() {
                if let Value::Object(item) = item {
                    path.push(key.clone());
                    traverse_sub(arg, item, path, hooks)?;
                    path.pop();
                }
            }
        }
        Value::Object(map) => traverse_sub(arg, map, path, hooks)?,
        Value::Array(items) if arg.repeat() => {
            for (index, item) in items.iter_mut().enumerate() {
                if let Value::Object(item) = item {
                    path.push(index.to_string());
                    traverse_sub(arg, item, path, hooks)?;
                    path.pop();
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn traverse_sub<H: Hooks>(
    arg: ArgRef<'_>,
    map: &mut Map<String, Value>,
    path: &mut Vec<String>,
    hooks: &mut H,
) -> Result<(), H::Error> {
    hooks.sub(arg, map, path)?;
    for variant in arg.sub_variants() {
        hooks.variant(variant, map, path)?;
    }
    let flat = arg.flatten_sub_at(map, path)?;
    for sub in flat.into_values() {
        traverse(sub, map, path, hooks)?;
    }
    Ok(())
}

/// The payload as a mapping, or a type error at the root.
pub(crate) fn as_mapping<'v>(payload: &'v mut Value, name: &str) -> Result<&'v mut Map<String, Value>, ArgumentError> {
    match payload {
        Value::Object(map) => Ok(map),
        other => Err(ArgumentError::type_(
            &[],
            format!("payload holding key `{name}` must be a dict, gets {}", crate::dtype::Dtype::of(other)),
        )),
    }
}
