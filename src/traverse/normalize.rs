//! Normalization: alias renaming, default injection and pattern trimming,
//! each one pass of the shared walk.
use std::fmt;

use regex::Regex;
use serde_json::{Map, Value};

use super::{as_mapping, traverse, traverse_value, Hooks};
use crate::error::{ArgumentError, NormalizeError, PatternError};
use crate::schema::{ArgRef, VariantRef};

// ------ options ------ //

/// Full-match pattern selecting payload keys to drop.
#[derive(Clone, Debug)]
pub struct TrimPattern {
    source: String,
    matcher: Matcher,
}

#[derive(Clone, Debug)]
enum Matcher {
    Glob(glob::Pattern),
    Regex(Regex),
}

impl TrimPattern {
    /// Shell-style glob (`_*`, `tmp_?`).
    pub fn glob(pattern: &str) -> Result<Self, PatternError> {
        Ok(Self { source: pattern.to_string(), matcher: Matcher::Glob(glob::Pattern::new(pattern)?) })
    }

    /// Regular expression, anchored at both ends.
    pub fn regex(pattern: &str) -> Result<Self, PatternError> {
        let anchored = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self { source: pattern.to_string(), matcher: Matcher::Regex(anchored) })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, key: &str) -> bool {
        match &self.matcher {
            Matcher::Glob(glob) => glob.matches(key),
            Matcher::Regex(regex) => regex.is_match(key),
        }
    }
}

impl fmt::Display for TrimPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Clone, Debug)]
pub struct NormalizeOptions {
    pub do_alias: bool,
    pub do_default: bool,
    pub trim: Option<TrimPattern>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self { do_alias: true, do_default: true, trim: None }
    }
}

impl NormalizeOptions {
    pub fn trim(mut self, pattern: TrimPattern) -> Self {
        self.trim = Some(pattern);
        self
    }
}

// ------ hooks ------ //

struct AliasHooks;

impl Hooks for AliasHooks {
    type Error = ArgumentError;

    /// First alias present wins; an existing canonical key is never overwritten.
    fn key(&mut self, arg: ArgRef<'_>, map: &mut Map<String, Value>, _: &[String]) -> Result<(), ArgumentError> {
        if map.contains_key(arg.name()) {
            return Ok(());
        }
        for alias in arg.alias() {
            if let Some(value) = map.shift_remove(alias) {
                map.insert(arg.name().to_string(), value);
                break;
            }
        }
        Ok(())
    }

    fn variant(&mut self, variant: VariantRef<'_>, map: &mut Map<String, Value>, _: &[String]) -> Result<(), ArgumentError> {
        let Some(Value::String(tag)) = map.get(variant.flag_name()) else {
            return Ok(());
        };
        if variant.choice(tag).is_some() {
            return Ok(());
        }
        if let Some(canonical) = variant.choice_alias().get(tag) {
            map.insert(variant.flag_name().to_string(), Value::String(canonical.clone()));
        }
        Ok(())
    }
}

struct DefaultHooks;

impl Hooks for DefaultHooks {
    type Error = ArgumentError;

    fn key(&mut self, arg: ArgRef<'_>, map: &mut Map<String, Value>, _: &[String]) -> Result<(), ArgumentError> {
        if let (true, false, Some(default)) = (arg.optional(), map.contains_key(arg.name()), arg.default()) {
            map.insert(arg.name().to_string(), default.clone());
        }
        Ok(())
    }
}

struct TrimHooks<'p> {
    pattern: &'p TrimPattern,
}

impl Hooks for TrimHooks<'_> {
    type Error = NormalizeError;

    fn sub(&mut self, arg: ArgRef<'_>, map: &mut Map<String, Value>, path: &[String]) -> Result<(), NormalizeError> {
        let reserved = arg.flatten_sub_at(map, path)?;
        trim_map(map, self.pattern, reserved.keys().copied(), path)
    }
}

/// Drop every key of `map` matching `pattern`, unless the pattern also
/// matches one of the `reserved` names.
fn trim_map<'r>(
    map: &mut Map<String, Value>,
    pattern: &TrimPattern,
    reserved: impl IntoIterator<Item = &'r str>,
    path: &[String],
) -> Result<(), NormalizeError> {
    let names: Vec<String> = reserved.into_iter().filter(|name| pattern.is_match(name)).map(str::to_string).collect();
    if !names.is_empty() {
        return Err(NormalizeError::TrimConflict { pattern: pattern.to_string(), names });
    }
    map.retain(|key, _| {
        let keep = !pattern.is_match(key);
        if !keep {
            tracing::debug!(key = key.as_str(), path = %path.join("/"), "trimmed");
        }
        keep
    });
    Ok(())
}

// ------ entry points ------ //

enum Target<'v> {
    /// Payload holding the node's name as a key.
    Keyed(&'v mut Map<String, Value>),
    /// The node's value itself.
    Bare(&'v mut Value),
}

impl Target<'_> {
    fn walk<H: Hooks>(&mut self, arg: ArgRef<'_>, hooks: &mut H) -> Result<(), H::Error> {
        match self {
            Target::Keyed(map) => traverse(arg, map, &mut Vec::new(), hooks),
            Target::Bare(value) => traverse_value(arg, value, &mut vec![arg.name().to_string()], hooks),
        }
    }
}

impl ArgRef<'_> {
    /// Normalized copy of `payload`; the input is left as is.
    pub fn normalize(&self, payload: &Value, options: &NormalizeOptions) -> Result<Value, NormalizeError> {
        tracing::debug!(node = self.name(), trim = ?options.trim.as_ref().map(TrimPattern::as_str), "normalize");
        let mut out = payload.clone();
        let map = as_mapping(&mut out, self.name())?;
        self.run_passes(Target::Keyed(map), options)?;
        Ok(out)
    }

    /// Normalized copy of a bare value governed by this node.
    pub fn normalize_value(&self, value: &Value, options: &NormalizeOptions) -> Result<Value, NormalizeError> {
        tracing::debug!(node = self.name(), trim = ?options.trim.as_ref().map(TrimPattern::as_str), "normalize value");
        let mut out = value.clone();
        self.run_passes(Target::Bare(&mut out), options)?;
        Ok(out)
    }

    /// Like [`normalize`](Self::normalize), writing the result back into
    /// `payload` only when every pass succeeded.
    pub fn normalize_in_place(&self, payload: &mut Value, options: &NormalizeOptions) -> Result<(), NormalizeError> {
        *payload = self.normalize(payload, options)?;
        Ok(())
    }

    pub fn normalize_value_in_place(&self, value: &mut Value, options: &NormalizeOptions) -> Result<(), NormalizeError> {
        *value = self.normalize_value(value, options)?;
        Ok(())
    }

    fn run_passes(&self, mut target: Target<'_>, options: &NormalizeOptions) -> Result<(), NormalizeError> {
        if options.do_alias {
            target.walk(*self, &mut AliasHooks)?;
        }
        if options.do_default {
            target.walk(*self, &mut DefaultHooks)?;
        }
        if let Some(pattern) = &options.trim {
            if let Target::Keyed(map) = &mut target {
                trim_map(map, pattern, [self.name()], &[])?;
            }
            target.walk(*self, &mut TrimHooks { pattern })?;
        }
        Ok(())
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::Dtype;
    use crate::schema::{ArgId, Argument, Schema, Variant};
    use serde_json::json;

    fn trimmed(pattern: &str) -> NormalizeOptions {
        NormalizeOptions::default().trim(TrimPattern::glob(pattern).unwrap())
    }

    #[test]
    fn default_injection() {
        let mut s = Schema::new();
        let ca = s.add_argument(Argument::new("Key1", [Dtype::Int]).optional(true).with_default(1)).unwrap();
        let ca = s.arg(ca);
        let beg = json!({});
        assert_eq!(ca.normalize(&beg, &NormalizeOptions::default()).unwrap(), json!({"Key1": 1}));
        assert_eq!(beg, json!({}));

        let mut beg = json!({});
        ca.normalize_in_place(&mut beg, &NormalizeOptions::default()).unwrap();
        assert_eq!(beg, json!({"Key1": 1}));
    }

    #[test]
    fn null_default_is_injected_but_no_default_is_not() {
        let mut s = Schema::new();
        let null = s.add_argument(Argument::new("k", [Dtype::Int]).optional(true).with_default(Value::Null)).unwrap();
        let none = s.add_argument(Argument::new("k", [Dtype::Int]).optional(true)).unwrap();
        let opts = NormalizeOptions::default();
        assert_eq!(s.arg(null).normalize(&json!({}), &opts).unwrap(), json!({"k": null}));
        assert_eq!(s.arg(none).normalize(&json!({}), &opts).unwrap(), json!({}));
        assert!(s.arg(null).dtype().contains(&Dtype::Null));
    }

    #[test]
    fn alias_renaming() {
        let mut s = Schema::new();
        let ca = s.add_argument(Argument::new("k", [Dtype::Int]).optional(true).with_default(1).alias(["old"])).unwrap();
        let ca = s.arg(ca);
        let opts = NormalizeOptions::default();

        let beg = json!({"old": 5});
        assert_eq!(ca.normalize(&beg, &opts).unwrap(), json!({"k": 5}));
        assert_eq!(beg, json!({"old": 5}));
        assert_eq!(ca.normalize(&json!({}), &opts).unwrap(), json!({"k": 1}));

        // canonical key wins and the alias is left alone
        assert_eq!(ca.normalize(&json!({"k": 1, "old": 2}), &opts).unwrap(), json!({"k": 1, "old": 2}));

        let mut s = Schema::new();
        let two = s.add_argument(Argument::new("Key1", [Dtype::Int]).alias(["Old1", "Old2"])).unwrap();
        let mut beg = json!({"Old2": 1});
        s.arg(two).normalize_in_place(&mut beg, &opts).unwrap();
        assert_eq!(beg, json!({"Key1": 1}));
    }

    #[test]
    fn trim_and_conflicts() {
        let mut s = Schema::new();
        let ca = s.add_argument(Argument::new("Key1", [Dtype::Int])).unwrap();
        let ca = s.arg(ca);
        let mut beg = json!({"Key1": 1, "_comment": 123});
        assert_eq!(ca.normalize(&beg, &trimmed("_*")).unwrap(), json!({"Key1": 1}));
        assert_eq!(beg, json!({"Key1": 1, "_comment": 123}));

        let err = ca.normalize_in_place(&mut beg, &trimmed("Key1")).unwrap_err();
        assert!(matches!(err, NormalizeError::TrimConflict { ref names, .. } if names == &["Key1".to_string()]));
        assert_eq!(beg, json!({"Key1": 1, "_comment": 123}));

        ca.normalize_in_place(&mut beg, &trimmed("_*")).unwrap();
        assert_eq!(beg, json!({"Key1": 1}));
    }

    #[test]
    fn regex_trim_matches_whole_keys() {
        let pattern = TrimPattern::regex("tmp_[0-9]+").unwrap();
        assert!(pattern.is_match("tmp_12"));
        assert!(!pattern.is_match("my_tmp_12"));
        assert!(!pattern.is_match("tmp_12x"));
        assert!(TrimPattern::regex("(").is_err());
        assert!(TrimPattern::glob("[").is_err());
    }

    #[test]
    fn combined() {
        let mut s = Schema::new();
        let sub1 = s.add_argument(Argument::new("sub1", [Dtype::Int]).optional(true).with_default(1).alias(["sub1a"])).unwrap();
        let sub2 = s
            .add_argument(Argument::new("sub2", [Dtype::Str]).optional(true).with_default("haha").alias(["sub2a"]))
            .unwrap();
        let ca = s.add_argument(Argument::new("base", [Dtype::Dict]).sub_fields([sub1, sub2])).unwrap();
        let ca = s.arg(ca);
        let opts = NormalizeOptions::default();

        let beg1 = json!({"base": {}});
        let ref1 = json!({"base": {"sub1": 1, "sub2": "haha"}});
        assert_eq!(ca.normalize(&beg1, &opts).unwrap(), ref1);
        assert_eq!(ca.normalize_value(&beg1["base"], &opts).unwrap(), ref1["base"]);

        let beg2 = json!({"base": {"sub1a": 2, "sub2a": "hoho", "_comment": null}});
        let ref2 = json!({"base": {"sub1": 2, "sub2": "hoho"}});
        assert_eq!(ca.normalize(&beg2, &trimmed("_*")).unwrap(), ref2);
        assert_eq!(ca.normalize_value(&beg2["base"], &trimmed("_*")).unwrap(), ref2["base"]);
    }

    fn complicated(s: &mut Schema) -> ArgId {
        let opt = |name: &str, dtype: Dtype, default: Value, alias: &str| {
            Argument::new(name, [dtype]).optional(true).with_default(default).alias([alias])
        };
        let sub1 = s.add_argument(opt("sub1", Dtype::Int, json!(1), "sub1a")).unwrap();
        let ss1 = s.add_argument(opt("ss1", Dtype::Int, json!(21), "ss1a")).unwrap();
        let sub2 = s
            .add_argument(Argument::new("sub2", [Dtype::List]).sub_fields([ss1]).repeat(true).alias(["sub2a"]))
            .unwrap();

        let shared1 = s.add_argument(opt("shared", Dtype::Int, json!(-1), "shareda")).unwrap();
        let vnt1 = s.add_argument(opt("vnt1", Dtype::Int, json!(111), "vnt1a")).unwrap();
        let type1 = s.add_argument(Argument::new("type1", [Dtype::Dict]).sub_fields([shared1, vnt1])).unwrap();
        let shared2 = s.add_argument(opt("shared", Dtype::Int, json!(-2), "sharedb")).unwrap();
        let vnt2 = s.add_argument(opt("vnt2", Dtype::Int, json!(222), "vnt2a")).unwrap();
        let type2 = s
            .add_argument(Argument::new("type2", [Dtype::Dict]).sub_fields([shared2, vnt2]).alias(["type3"]))
            .unwrap();
        let vnt = s.add_variant(Variant::new("vnt_flag").choices([type1, type2]).default_tag("type1")).unwrap();

        s.add_argument(Argument::new("base", [Dtype::Dict]).sub_fields([sub1, sub2]).sub_variants([vnt])).unwrap()
    }

    #[test]
    fn complicated_defaults_aliases_and_trim() {
        let mut s = Schema::new();
        let ca = complicated(&mut s);
        let ca = s.arg(ca);

        let beg1 = json!({"base": {"sub2": [{}, {}]}});
        let ref1 = json!({"base": {
            "sub1": 1, "sub2": [{"ss1": 21}, {"ss1": 21}],
            "vnt_flag": "type1", "shared": -1, "vnt1": 111,
        }});
        assert_eq!(ca.normalize(&beg1, &NormalizeOptions::default()).unwrap(), ref1);
        assert_eq!(ca.normalize_value(&beg1["base"], &NormalizeOptions::default()).unwrap(), ref1["base"]);
        ca.check(&ref1, true).unwrap();

        let beg2 = json!({"base": {
            "sub1a": 2, "sub2a": [{"ss1a": 22}, {"_comment1": null}],
            "vnt_flag": "type3", "sharedb": -3, "vnt2a": 223, "_comment2": null,
        }});
        let ref2 = json!({"base": {
            "sub1": 2, "sub2": [{"ss1": 22}, {"ss1": 21}],
            "vnt_flag": "type2", "shared": -3, "vnt2": 223,
        }});
        assert_eq!(ca.normalize(&beg2, &trimmed("_*")).unwrap(), ref2);
        assert_eq!(ca.normalize_value(&beg2["base"], &trimmed("_*")).unwrap(), ref2["base"]);

        for pattern in ["sub*", "vnt*"] {
            let err = ca.normalize(&beg2, &trimmed(pattern)).unwrap_err();
            assert!(matches!(err, NormalizeError::TrimConflict { .. }), "{pattern}");
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut s = Schema::new();
        let ca = complicated(&mut s);
        let ca = s.arg(ca);
        let opts = trimmed("_*");
        let beg = json!({"base": {"sub2a": [{"_x": 1}], "vnt_flag": "type3", "_y": 2}});
        let once = ca.normalize(&beg, &opts).unwrap();
        assert_eq!(ca.normalize(&once, &opts).unwrap(), once);
    }

    #[test]
    fn bad_tag_propagates() {
        let mut s = Schema::new();
        let ca = complicated(&mut s);
        let err = s.arg(ca).normalize(&json!({"base": {"vnt_flag": "nope"}}), &NormalizeOptions::default()).unwrap_err();
        assert!(matches!(err, NormalizeError::Argument(ref e) if e.is_value()));
    }
}
