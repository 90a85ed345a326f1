//! JSON Schema (draft 2020-12) export.
//!
//! Variant branches become `allOf` entries of the form
//! `{"if": <flag equals tag or alias>, "then": <choice schema>}`; a required
//! field that has aliases becomes a `oneOf` over its accepted names instead of
//! a `required` entry.
use serde_json::{json, Map, Value};

use crate::dtype::Dtype;
use crate::schema::ArgRef;

pub const DRAFT: &str = "https://json-schema.org/draft/2020-12/schema";

/// Schema for the value held under `arg`'s name. An empty `id` leaves out `$id`.
pub fn generate_json_schema(arg: ArgRef<'_>, id: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("$schema".into(), DRAFT.into());
    if !id.is_empty() {
        schema.insert("$id".into(), id.into());
    }
    schema.insert("title".into(), arg.name().into());
    schema.extend(convert_argument(arg));
    Value::Object(schema)
}

fn convert_argument(arg: ArgRef<'_>) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("description".into(), arg.doc().into());
    if let Some(types) = json_types(arg.dtype()) {
        data.insert("type".into(), types);
    }
    if let Some(default) = arg.default() {
        data.insert("default".into(), default.clone());
    }

    let mut properties = Map::new();
    for field in arg.sub_fields() {
        let converted = Value::Object(convert_argument(field));
        for name in std::iter::once(field.name()).chain(field.alias().iter().map(String::as_str)) {
            properties.insert(name.to_string(), converted.clone());
        }
    }
    for variant in arg.sub_variants() {
        let tags: Vec<&str> = variant
            .choices()
            .map(|c| c.name())
            .chain(variant.choice_alias().keys().map(String::as_str))
            .collect();
        let mut flag = json!({"type": "string", "enum": tags, "description": variant.doc()});
        if let Some(tag) = variant.default_tag() {
            flag["default"] = tag.into();
        }
        properties.insert(variant.flag_name().to_string(), flag);
    }

    let required: Vec<&str> = arg
        .sub_fields()
        .filter(|f| !f.optional() && f.alias().is_empty())
        .map(|f| f.name())
        .chain(arg.sub_variants().filter(|v| !v.optional()).map(|v| v.flag_name()))
        .collect();

    let mut all_of = Vec::new();
    for variant in arg.sub_variants() {
        for choice in variant.choices() {
            let tag = choice.name();
            let selectors: Vec<Value> = std::iter::once(tag)
                .chain(choice.alias().iter().map(String::as_str))
                .map(|t| json!({"properties": {(variant.flag_name()): {"const": t}}}))
                .collect();
            let flag_required: Vec<&str> =
                if variant.default_tag() == Some(tag) { Vec::new() } else { vec![variant.flag_name()] };
            all_of.push(json!({
                "if": {"oneOf": selectors, "required": flag_required},
                "then": Value::Object(convert_argument(choice)),
            }));
        }
    }
    for field in arg.sub_fields().filter(|f| !f.optional() && !f.alias().is_empty()) {
        let names: Vec<Value> = std::iter::once(field.name())
            .chain(field.alias().iter().map(String::as_str))
            .map(|n| json!({"required": [n]}))
            .collect();
        all_of.push(json!({"oneOf": names}));
    }

    if arg.repeat() {
        let mut items = Map::new();
        items.insert("type".into(), "object".into());
        items.insert("properties".into(), Value::Object(properties));
        items.insert("required".into(), required.into());
        if !all_of.is_empty() {
            items.insert("allOf".into(), all_of.into());
        }
        data.insert("items".into(), Value::Object(items));
    } else {
        data.insert("properties".into(), Value::Object(properties));
        data.insert("required".into(), required.into());
        if !all_of.is_empty() {
            data.insert("allOf".into(), all_of.into());
        }
    }
    data
}

/// `None` when any kind is accepted.
fn json_types(dtypes: &crate::dtype::Dtypes) -> Option<Value> {
    let mut names: Vec<&str> = Vec::new();
    for t in dtypes {
        let name = match t {
            Dtype::Any => return None,
            Dtype::Null => "null",
            Dtype::Bool => "boolean",
            Dtype::Int => "integer",
            Dtype::Float => "number",
            Dtype::Str => "string",
            Dtype::List | Dtype::ListOf(_) => "array",
            Dtype::Dict => "object",
        };
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Some(names.into())
}
