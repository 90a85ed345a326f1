//! Validation: existence, type and predicate hooks, plus the strict
//! unknown-key hook.
use serde_json::{Map, Value};

use super::{as_mapping, traverse, traverse_value, Hooks};
use crate::dtype::{self, Dtype};
use crate::error::ArgumentError;
use crate::schema::{ArgRef, VariantRef};
use crate::suggest;

struct CheckHooks {
    strict: bool,
}

impl Hooks for CheckHooks {
    type Error = ArgumentError;

    fn key(&mut self, arg: ArgRef<'_>, map: &mut Map<String, Value>, path: &[String]) -> Result<(), ArgumentError> {
        if arg.optional() || map.contains_key(arg.name()) {
            return Ok(());
        }
        Err(ArgumentError::key(path, format!("key `{}` is required in arguments but not found", arg.name())))
    }

    fn value(&mut self, arg: ArgRef<'_>, value: &Value, path: &[String]) -> Result<(), ArgumentError> {
        if !arg.accepts(value) {
            return Err(ArgumentError::type_(
                path,
                format!(
                    "key `{}` gets wrong value type: requires {} but gets {}",
                    arg.name(),
                    dtype::describe(arg.dtype()),
                    Dtype::of(value),
                ),
            ));
        }
        if let Some(check) = arg.extra_check() {
            if !check.call(value) {
                return Err(ArgumentError::value(
                    path,
                    format!("key `{}` gets bad value that fails to pass its extra checking", arg.name()),
                ));
            }
        }
        if arg.repeat() {
            let elements: Vec<(String, &Value)> = match value {
                Value::Array(items) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
                Value::Object(items) => items.iter().map(|(k, v)| (k.clone(), v)).collect(),
                _ => Vec::new(),
            };
            if let Some((at, item)) = elements.into_iter().find(|(_, v)| !v.is_object()) {
                let mut path = path.to_vec();
                path.push(at);
                return Err(ArgumentError::type_(
                    &path,
                    format!("element of repeated key `{}` must be a dict, gets {}", arg.name(), Dtype::of(item)),
                ));
            }
        }
        Ok(())
    }

    fn sub(&mut self, arg: ArgRef<'_>, map: &mut Map<String, Value>, path: &[String]) -> Result<(), ArgumentError> {
        // a dict with no declared structure is free-form
        if !self.strict || !arg.has_sub() {
            return Ok(());
        }
        let allowed = arg.flatten_sub_at(map, path)?;
        match map.keys().find(|key| !allowed.contains_key(key.as_str())) {
            Some(key) => Err(unknown_key(key, allowed.keys().copied(), path)),
            None => Ok(()),
        }
    }

    fn variant(&mut self, variant: VariantRef<'_>, map: &mut Map<String, Value>, path: &[String]) -> Result<(), ArgumentError> {
        variant.get_choice_at(map, path).map(drop)
    }
}

fn unknown_key<'c>(key: &str, allowed: impl IntoIterator<Item = &'c str>, path: &[String]) -> ArgumentError {
    let mut message = format!("undefined key `{key}` is not allowed in strict mode.");
    if let Some(hint) = suggest::did_you_mean(key, allowed) {
        message.push_str(&format!(" Did you mean: {hint}?"));
    }
    let mut at = path.to_vec();
    at.push(key.to_string());
    ArgumentError::key(&at, message)
}

impl ArgRef<'_> {
    /// Validate `payload[name]` against this node and everything below it.
    ///
    /// Under `strict`, keys not reachable through the schema (given the
    /// payload's own variant flags) are rejected, including root keys other
    /// than `name`.
    ///
    /// The walk runs over a private copy, so `payload` is never touched even
    /// though the hooks receive mutable access.
    pub fn check(&self, payload: &Value, strict: bool) -> Result<(), ArgumentError> {
        tracing::debug!(node = self.name(), strict, "check");
        let mut scratch = payload.clone();
        let map = as_mapping(&mut scratch, self.name())?;
        if strict {
            if let Some(key) = map.keys().find(|key| *key != self.name()) {
                return Err(unknown_key(key, [self.name()], &[]));
            }
        }
        traverse(*self, map, &mut Vec::new(), &mut CheckHooks { strict })
    }

    /// Same as [`check`](Self::check) on `{name: value}`.
    pub fn check_value(&self, value: &Value, strict: bool) -> Result<(), ArgumentError> {
        tracing::debug!(node = self.name(), strict, "check value");
        let mut scratch = value.clone();
        let mut path = vec![self.name().to_string()];
        traverse_value(*self, &mut scratch, &mut path, &mut CheckHooks { strict })
    }
}

// ------------------------------- Tests ------------------------------------ //
