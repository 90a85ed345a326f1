//! reStructuredText documentation for a schema tree.
//!
//! Anchor ids are the nodes' structural paths, so a link target such as
//! `base[type1]/shared` can be fed straight back to [`ArgRef::get`] on a
//! wrapped root.
use serde_json::Value;

use crate::schema::{ArgRef, VariantRef};

const INDENT: &str = "    ";

#[derive(Clone, Debug, Default)]
pub struct DocOptions {
    /// Precede every node with a raw-HTML anchor named after its path.
    pub make_anchor: bool,
}

impl ArgRef<'_> {
    pub fn gen_doc(&self, options: &DocOptions) -> String {
        self.gen_doc_at(&[], options)
    }

    fn gen_doc_at(&self, paths: &[String], options: &DocOptions) -> String {
        let mut sub_paths = paths.to_vec();
        sub_paths.push(self.name().to_string());
        let parts = [
            self.doc_head(&sub_paths, options),
            indent(&doc_path(&sub_paths), INDENT),
            indent(&self.doc_body(&sub_paths, options), INDENT),
        ];
        join_nonempty(parts)
    }

    pub(crate) fn doc_head(&self, paths: &[String], options: &DocOptions) -> String {
        let types: Vec<String> = self.dtype().iter().map(|t| format!("``{t}``")).collect();
        let mut typesig = format!("| type: {}", types.join(" | "));
        if self.optional() {
            typesig.push_str(", optional");
            if let Some(default) = self.default() {
                typesig.push_str(&format!(", default: ``{}``", literal(default)));
            }
        }
        if !self.alias().is_empty() {
            let plural = if self.alias().len() > 1 { "es" } else { "" };
            let names: Vec<String> = self.alias().iter().map(|a| format!("*{a}*")).collect();
            typesig.push_str(&format!(", alias{plural}: {}", names.join(", ")));
        }
        let head = format!("{}: \n{}", self.name(), indent(&typesig, INDENT));
        if options.make_anchor {
            format!("{}\n{head}", anchor(paths))
        } else {
            head
        }
    }

    fn doc_body(&self, paths: &[String], options: &DocOptions) -> String {
        let mut body = Vec::new();
        if !self.doc().is_empty() {
            body.push(format!("{}\n", self.doc()));
        }
        if self.repeat() {
            body.push("This argument takes a list with each element containing the following: \n".to_string());
        }
        for field in self.sub_fields() {
            body.push(field.gen_doc_at(paths, options));
        }
        let show_flag = self.sub_variants().len() > 1;
        for variant in self.sub_variants() {
            body.push(variant.gen_doc_at(paths, show_flag, options));
        }
        body.join("\n")
    }
}

impl VariantRef<'_> {
    fn gen_doc_at(&self, paths: &[String], show_flag: bool, options: &DocOptions) -> String {
        let flag = self.flag_name();
        let mut body = vec![
            String::new(),
            format!("Depending on the value of *{flag}*, different sub args are accepted. \n"),
            self.doc_flag(paths, options),
        ];
        for choice in self.choices() {
            body.push(String::new());
            let choice_path = self.choice_path(choice.name(), paths, show_flag);
            if options.make_anchor {
                body.push(anchor(&choice_path));
            }
            let aliases = match choice.alias() {
                [] => String::new(),
                alias => {
                    let plural = if alias.len() > 1 { "es" } else { "" };
                    let names: Vec<String> = alias.iter().map(|a| format!("``{a}``")).collect();
                    format!(" (or its alias{plural} {})", names.join(", "))
                }
            };
            body.push(format!("When *{flag}* is set to ``{}``{aliases}: \n", choice.name()));
            body.push(choice.doc_body(&choice_path, options));
        }
        body.join("\n")
    }

    fn doc_flag(&self, paths: &[String], options: &DocOptions) -> String {
        let mut arg_path = paths.to_vec();
        arg_path.push(self.flag_name().to_string());

        let mut typedoc = "| type: ``str`` (flag key)".to_string();
        if let Some(tag) = self.default_tag() {
            typedoc.push_str(&format!(", default: ``{tag}``"));
        }
        let tags: Vec<&str> = self.choices().map(|c| c.name()).collect();
        let mut parts = Vec::new();
        if options.make_anchor {
            parts.push(anchor(&arg_path));
        }
        parts.push(format!("{}:", self.flag_name()));
        parts.push(indent(&typedoc, INDENT));
        parts.push(indent(&format!("| argument path: ``{}`` ", arg_path.join("/")), INDENT));
        parts.push(indent(&format!("| possible choices: {}", tags.join(", ")), INDENT));
        parts.push(String::new());
        if !self.doc().is_empty() {
            parts.push(indent(&format!("{}\n", self.doc()), INDENT));
        }
        parts.join("\n")
    }

    /// `parent[tag]`, or `parent[flag=tag]` when the parent has several variants.
    fn choice_path(&self, tag: &str, paths: &[String], show_flag: bool) -> Vec<String> {
        let selector = if show_flag { format!("[{}={tag}]", self.flag_name()) } else { format!("[{tag}]") };
        match paths.split_last() {
            Some((last, parents)) => {
                let mut path = parents.to_vec();
                path.push(format!("{last}{selector}"));
                path
            }
            None => vec![selector],
        }
    }
}

fn doc_path(paths: &[String]) -> String {
    format!("| argument path: ``{}``\n", paths.join("/"))
}

fn anchor(paths: &[String]) -> String {
    format!(".. raw:: html\n\n   <a id=\"{}\"></a>", paths.join("/"))
}

/// Strings bare, everything else as JSON.
fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Prefix every line that is not blank.
fn indent(text: &str, prefix: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| if line.trim().is_empty() { line.to_string() } else { format!("{prefix}{line}") })
        .collect()
}

fn join_nonempty(parts: impl IntoIterator<Item = String>) -> String {
    parts.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::load_str;
    use crate::dtype::Dtype;
    use crate::schema::{Argument, Schema, Variant};

    #[test]
    fn indent_skips_blank_lines() {
        assert_eq!(indent("a\n\nb\n", "  "), "  a\n\n  b\n");
    }

    #[test]
    fn head_path_and_body() {
        let mut s = Schema::new();
        let sub1 = s
            .add_argument(Argument::new("sub1", [Dtype::Int]).optional(true).with_default(1).alias(["s1", "one"]).doc("sub doc."))
            .unwrap();
        let base = s
            .add_argument(Argument::new("base", [Dtype::List]).sub_fields([sub1]).repeat(true).doc("Base doc."))
            .unwrap();
        let doc = s.arg(base).gen_doc(&DocOptions::default());
        let expected = [
            "base: ",
            "    | type: ``list``",
            "    | argument path: ``base``",
            "",
            "    Base doc.",
            "",
            "    This argument takes a list with each element containing the following: ",
            "",
            "    sub1: ",
            "        | type: ``int``, optional, default: ``1``, aliases: *s1*, *one*",
            "        | argument path: ``base/sub1``",
            "",
            "        sub doc.",
            "",
        ];
        assert_eq!(doc, expected.join("\n"));
        assert!(!doc.contains("<a id="));
    }

    #[test]
    fn variants_and_anchors() {
        let (mut s, root) = load_str(
            r#"{"name": "base", "dtype": "dict", "sub_variants": [
                {"flag_name": "kind", "default_tag": "type1", "doc": "pick one", "choices": [
                    {"name": "type1", "dtype": "dict", "sub_fields": [{"name": "shared", "dtype": "int"}]},
                    {"name": "type2", "dtype": "dict", "alias": ["t2"]}
                ]}
            ]}"#,
        )
        .unwrap();
        let doc = s.arg(root).gen_doc(&DocOptions { make_anchor: true });
        assert!(doc.contains("Depending on the value of *kind*, different sub args are accepted."));
        assert!(doc.contains("| type: ``str`` (flag key), default: ``type1``"));
        assert!(doc.contains("| possible choices: type1, type2"));
        assert!(doc.contains("When *kind* is set to ``type2`` (or its alias ``t2``): "));
        for id in ["base", "base/kind", "base[type1]", "base[type1]/shared", "base[type2]"] {
            assert!(doc.contains(&format!("<a id=\"{id}\"></a>")), "{id}");
        }

        let wrapped = s.wrap(root);
        let top = s.arg(wrapped);
        assert_eq!(top.get("base[type1]/shared").unwrap().name(), "shared");

        let other = s.add_variant(Variant::new("mode")).unwrap();
        s.attach_subvariant(root, other).unwrap();
        let doc = s.arg(root).gen_doc(&DocOptions { make_anchor: true });
        assert!(doc.contains("<a id=\"base[kind=type1]/shared\"></a>"));
        assert_eq!(s.arg(wrapped).get("base[kind=type1]/shared").unwrap().name(), "shared");
    }
}
