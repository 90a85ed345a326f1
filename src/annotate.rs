//! A payload rendered as an HTML code block where every key the schema knows
//! carries a hover tooltip with its type signature and doc.
//!
//! Keys are resolved the same way the checker resolves them: own sub-fields,
//! plus the fields of whichever choice each variant flag currently selects
//! (falling back to the default tag). Unknown keys are rendered plainly.
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::doc::DocOptions;
use crate::schema::{ArgRef, VariantRef};

static LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"`+(.*?)`+").expect("literal regex"));
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.+?)\*").expect("emphasis regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n+").expect("blank line regex"));

const BR: &str = "<br/>";

pub const CSS: &str = r#"<style>
.jargs-codeblock { width: 100%; background-color: #f9f9f9; color: #000000; }
.jargs-codeblock::before { counter-reset: listing; }
.jargs-codeblock code.jargs-linebegin { counter-increment: listing; }
.jargs-codeblock code.jargs-linebegin::before {
  content: counter(listing) " "; display: inline-block; width: 2em; text-align: right; color: #6e7781;
}
.jargs-codeblock code.jargs-code { padding: 0; margin: 0; background-color: #f9f9f9; color: #000000; }
.jargs-codeblock .jargs-key { position: relative; display: inline-block; border-bottom: 1px dotted black; }
.jargs-codeblock .jargs-key code.jargs-code { color: #0550ae; }
.jargs-codeblock .jargs-key .jargs-doc {
  visibility: hidden; width: 600px; background-color: black; color: #fff;
  padding: 1em 1em; border-radius: 6px; position: absolute; z-index: 1;
}
.jargs-codeblock .jargs-key:hover .jargs-doc { visibility: visible; }
.jargs-codeblock .jargs-key .jargs-doc .jargs-doc-code { color: #bbbbff; }
</style>
"#;

/// What governs one payload key.
#[derive(Clone, Copy)]
enum Governor<'a> {
    Arg(ArgRef<'a>),
    Flag(VariantRef<'a>),
    Unknown,
}

impl ArgRef<'_> {
    /// Stylesheet plus the annotated block for `value`, this node's own value.
    pub fn annotate_html(&self, value: &Value) -> String {
        format!("{CSS}{}", self.annotate_block(value))
    }

    /// The annotated block alone, for pages holding several payloads under one [`CSS`].
    pub fn annotate_block(&self, value: &Value) -> String {
        let mut out = String::from(r#"<div class="jargs-codeblock">"#);
        render(Governor::Arg(*self), None, value, 0, true, &mut out);
        out.push_str("</div>");
        out
    }
}

fn render(governor: Governor<'_>, key: Option<&str>, value: &Value, level: usize, last: bool, out: &mut String) {
    let indent = format!(r#"<code class="jargs-code jargs-linebegin">{}</code>"#, "&nbsp;".repeat(level * 2));
    let comma = if last { "" } else { "," };
    out.push_str(&indent);
    if let Some(key) = key {
        render_key(governor, key, out);
    }

    match (governor, value) {
        (Governor::Arg(arg), Value::Object(map)) if !map.is_empty() => {
            let children = children(arg, map);
            code(out, "{");
            out.push_str(BR);
            let count = children.len();
            for (i, (key, governor, value)) in children.into_iter().enumerate() {
                render(governor, Some(key), value, level + 1, i + 1 == count, out);
            }
            out.push_str(&indent);
            code(out, &format!("}}{comma}"));
            out.push_str(BR);
        }
        (Governor::Arg(arg), Value::Array(items)) if arg.repeat() && !items.is_empty() => {
            code(out, "[");
            out.push_str(BR);
            for (i, item) in items.iter().enumerate() {
                render(Governor::Arg(arg), None, item, level + 1, i + 1 == items.len(), out);
            }
            out.push_str(&indent);
            code(out, &format!("]{comma}"));
            out.push_str(BR);
        }
        _ => {
            let text = escape(&format!("{value:#}")).replace('\n', &format!("{BR}{indent}"));
            code(out, &format!("{text}{comma}"));
            out.push_str(BR);
        }
    }
}

fn render_key(governor: Governor<'_>, key: &str, out: &mut String) {
    let known = !matches!(governor, Governor::Unknown);
    out.push_str(if known { r#"<span class="jargs-key">"# } else { "<span>" });
    code(out, &format!("\"{}\"", escape(key)));
    match governor {
        Governor::Arg(arg) => {
            out.push_str(r#"<span class="jargs-doc">"#);
            let head = arg.doc_head(&[], &DocOptions::default()).replace("| type:", "type:");
            out.push_str(&markup(&escape(&head)).replace('\n', BR));
            tooltip_body(arg.doc(), out);
        }
        Governor::Flag(variant) => {
            out.push_str(r#"<span class="jargs-doc">"#);
            out.push_str(&format!("{}:{BR}type: {}", escape(variant.flag_name()), doc_code("str")));
            if let Some(tag) = variant.default_tag() {
                out.push_str(&format!(", default: {}", doc_code(&escape(tag))));
            }
            tooltip_body(variant.doc(), out);
        }
        Governor::Unknown => {}
    }
    out.push_str("</span>");
    code(out, ": ");
}

fn tooltip_body(doc: &str, out: &mut String) {
    out.push_str(BR);
    out.push_str(BR);
    let doc = BLANK_LINES.replace_all(doc.trim(), "\n");
    out.push_str(&markup(&escape(&doc)).replace('\n', BR));
    out.push_str("</span>");
}

/// Payload keys paired with the node governing each, in payload order.
fn children<'a, 'v>(arg: ArgRef<'a>, map: &'v Map<String, Value>) -> Vec<(&'v str, Governor<'a>, &'v Value)> {
    let mut fields = IndexMap::new();
    let mut flags = IndexMap::new();
    collect(arg, map, &mut fields, &mut flags);
    map.iter()
        .map(|(key, value)| {
            let governor = match (fields.get(key.as_str()), flags.get(key.as_str())) {
                (Some(&field), _) => Governor::Arg(field),
                (None, Some(&variant)) => Governor::Flag(variant),
                (None, None) => Governor::Unknown,
            };
            (key.as_str(), governor, value)
        })
        .collect()
}

/// Lenient flattening: an unresolvable flag contributes only itself.
fn collect<'a>(
    arg: ArgRef<'a>,
    map: &Map<String, Value>,
    fields: &mut IndexMap<&'a str, ArgRef<'a>>,
    flags: &mut IndexMap<&'a str, VariantRef<'a>>,
) {
    fields.extend(arg.sub_fields().map(|f| (f.name(), f)));
    for variant in arg.sub_variants() {
        flags.insert(variant.flag_name(), variant);
        let tag = map.get(variant.flag_name()).and_then(Value::as_str).or(variant.default_tag());
        if let Some(choice) = tag.and_then(|t| variant.resolve_tag(t)) {
            collect(choice, map, fields, flags);
        }
    }
}

fn code(out: &mut String, text: &str) {
    out.push_str(r#"<code class="jargs-code">"#);
    out.push_str(text);
    out.push_str("</code>");
}

fn doc_code(text: &str) -> String {
    format!(r#"<span class="jargs-doc-code">{text}</span>"#)
}

/// ``literal`` and *emphasis* to HTML.
fn markup(text: &str) -> String {
    let text = LITERAL.replace_all(text, r#"<span class="jargs-doc-code">$1</span>"#);
    EMPHASIS.replace_all(&text, "<i>$1</i>").into_owned()
}

pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::load_str;
    use serde_json::json;

    const SCHEMA: &str = r#"{
        "name": "train", "dtype": "dict",
        "sub_fields": [
            {"name": "lr", "dtype": "float", "optional": true, "default": 0.1, "doc": "Learning *rate* for `sgd`."},
            {"name": "layers", "dtype": "list", "repeat": true, "sub_fields": [{"name": "width", "dtype": "int", "doc": "units"}]}
        ],
        "sub_variants": [
            {"flag_name": "opt", "default_tag": "sgd", "doc": "optimizer", "choices": [
                {"name": "sgd", "dtype": "dict", "sub_fields": [{"name": "momentum", "dtype": "float", "optional": true}]},
                {"name": "adam", "dtype": "dict", "alias": ["Adam"], "sub_fields": [{"name": "beta", "dtype": "float"}]}
            ]}
        ]
    }"#;

    fn key_span(name: &str) -> String {
        format!(r#"<span class="jargs-key"><code class="jargs-code">"{name}"</code>"#)
    }

    #[test]
    fn known_keys_get_tooltips() {
        let (schema, root) = load_str(SCHEMA).unwrap();
        let html = schema.arg(root).annotate_html(&json!({"lr": 0.5, "momentum": 0.9, "extra": "<x>"}));
        assert!(html.starts_with(CSS));
        assert!(html.contains(&key_span("lr")));
        assert!(html.contains("type: <span class=\"jargs-doc-code\">float</span>, optional, default: <span class=\"jargs-doc-code\">0.1</span>"));
        assert!(html.contains("Learning <i>rate</i> for <span class=\"jargs-doc-code\">sgd</span>."));
        // resolved through the default tag
        assert!(html.contains(&key_span("momentum")));
        assert!(html.contains(r#"<span><code class="jargs-code">"extra"</code></span>"#));
        assert!(html.contains("&quot;&lt;x&gt;&quot;"));
        assert!(!html.contains("<x>"));
    }

    #[test]
    fn flags_choices_and_repeated_elements() {
        let (schema, root) = load_str(SCHEMA).unwrap();
        let html = schema.arg(root).annotate_html(&json!({
            "opt": "Adam", "beta": 0.99, "momentum": 0.9, "layers": [{"width": 8}, {"width": 4}]
        }));
        assert!(html.contains(&key_span("opt")));
        assert!(html.contains("opt:<br/>type: <span class=\"jargs-doc-code\">str</span>, default: <span class=\"jargs-doc-code\">sgd</span>"));
        assert!(html.contains(&key_span("beta")));
        // belongs to the unselected choice
        assert!(html.contains(r#"<span><code class="jargs-code">"momentum"</code></span>"#));
        assert_eq!(html.matches(&key_span("width")).count(), 2);
        assert!(html.contains(r#"<code class="jargs-code">[</code>"#));
    }

    #[test]
    fn bad_tags_and_scalars_render_without_failing() {
        let (schema, root) = load_str(SCHEMA).unwrap();
        let html = schema.arg(root).annotate_html(&json!({"opt": "nope", "beta": 1}));
        assert!(html.contains(&key_span("opt")));
        assert!(html.contains(r#"<span><code class="jargs-code">"beta"</code></span>"#));

        let html = schema.arg(root).annotate_html(&json!(3));
        assert!(html.ends_with(r#"<code class="jargs-code">3</code><br/></div>"#));
    }
}
