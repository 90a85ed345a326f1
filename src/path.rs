//! Structural paths addressing nodes through variant branches.
//!
//! ```text
//! path     := ("/"* segment)* "/"*
//! segment  := field | "[" selector "]"
//! selector := flag "=" tag | tag
//! ```
//!
//! `""` and `"."` address the node itself. A bare `[tag]` is only accepted
//! when the node has exactly one sub-variant.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::LookupError;
use crate::schema::{ArgRef, VariantRef};

static SELECTOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(?P<flag>[^=\[\]/]+)=)?(?P<tag>[^=\[\]/]+)$").expect("selector regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'p> {
    Field(&'p str),
    Choice { flag: Option<&'p str>, tag: &'p str },
}

pub fn parse(path: &str) -> Result<Vec<Segment<'_>>, LookupError> {
    let mut segments = Vec::new();
    let mut rest = path;
    loop {
        rest = rest.trim_start_matches('/');
        if rest.is_empty() {
            break;
        }
        if let Some(inner) = rest.strip_prefix('[') {
            let end = inner.find(']').ok_or_else(|| malformed(rest))?;
            segments.push(selector(&inner[..end])?);
            rest = &inner[end + 1..];
        } else {
            let end = rest.find(['/', '[']).unwrap_or(rest.len());
            let name = &rest[..end];
            if name != "." {
                segments.push(Segment::Field(name));
            }
            rest = &rest[end..];
        }
    }
    Ok(segments)
}

fn selector(text: &str) -> Result<Segment<'_>, LookupError> {
    let caps = SELECTOR.captures(text).ok_or_else(|| malformed(&format!("[{text}]")))?;
    let tag = caps.name("tag").map(|m| m.as_str()).ok_or_else(|| malformed(text))?;
    Ok(Segment::Choice { flag: caps.name("flag").map(|m| m.as_str()), tag })
}

fn malformed(segment: &str) -> LookupError {
    LookupError::Malformed { segment: segment.to_string() }
}

impl<'a> ArgRef<'a> {
    /// Resolve a structural path relative to this node.
    pub fn get(&self, path: &str) -> Result<ArgRef<'a>, LookupError> {
        let mut node = *self;
        for segment in parse(path)? {
            node = match segment {
                Segment::Field(field) => node.sub_field(field).ok_or_else(|| LookupError::NoField {
                    node: node.name().to_string(),
                    field: field.to_string(),
                })?,
                Segment::Choice { flag, tag } => {
                    let variant = node.variant_for(flag, tag)?;
                    variant.choice(tag).ok_or_else(|| LookupError::NoChoice {
                        flag: variant.flag_name().to_string(),
                        tag: tag.to_string(),
                    })?
                }
            };
        }
        Ok(node)
    }

    fn variant_for(&self, flag: Option<&str>, tag: &str) -> Result<VariantRef<'a>, LookupError> {
        if let Some(flag) = flag {
            return self.sub_variant(flag).ok_or_else(|| LookupError::NoVariant {
                node: self.name().to_string(),
                flag: flag.to_string(),
            });
        }
        let mut variants = self.sub_variants();
        match (variants.len(), variants.next()) {
            (1, Some(only)) => Ok(only),
            (0, _) => Err(LookupError::NoVariants { node: self.name().to_string() }),
            (count, _) => Err(LookupError::AmbiguousFlag {
                node: self.name().to_string(),
                count,
                tag: tag.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::Dtype;
    use crate::schema::{Argument, Schema, Variant};

    #[test]
    fn parse_segments() {
        assert_eq!(parse("").unwrap(), vec![]);
        assert_eq!(parse("./sub1").unwrap(), vec![Segment::Field("sub1")]);
        assert_eq!(
            parse("base[type3][vnt3_flag1=v3f1t1]//x/").unwrap(),
            vec![
                Segment::Field("base"),
                Segment::Choice { flag: None, tag: "type3" },
                Segment::Choice { flag: Some("vnt3_flag1"), tag: "v3f1t1" },
                Segment::Field("x"),
            ]
        );
        assert!(matches!(parse("[type1"), Err(LookupError::Malformed { .. })));
        assert!(matches!(parse("[a=b=c]"), Err(LookupError::Malformed { .. })));
        assert!(matches!(parse("[]"), Err(LookupError::Malformed { .. })));
    }

    #[test]
    fn index_fields_and_choices() {
        let mut s = Schema::new();
        let s1 = s.add_argument(Argument::new("sub1", [Dtype::Int])).unwrap();
        let shared1 = s.add_argument(Argument::new("shared", [Dtype::Str])).unwrap();
        let leaf = s.add_argument(Argument::new("vnt1_1_1", [Dtype::Int])).unwrap();
        let vnt1_1 = s.add_argument(Argument::new("vnt1_1", [Dtype::Dict]).sub_fields([leaf])).unwrap();
        let vt1 = s.add_argument(Argument::new("type1", [Dtype::Dict]).sub_fields([shared1, vnt1_1])).unwrap();
        let shared2 = s.add_argument(Argument::new("shared", [Dtype::Int])).unwrap();
        let vt2 = s.add_argument(Argument::new("type2", [Dtype::Dict]).sub_fields([shared2])).unwrap();
        let v1 = s.add_variant(Variant::new("vnt_flag").choices([vt1, vt2])).unwrap();
        let ca = s.add_argument(Argument::new("base", [Dtype::Dict]).sub_fields([s1]).sub_variants([v1])).unwrap();

        let root = s.arg(ca);
        assert_eq!(root.get("").unwrap().id(), ca);
        assert_eq!(root.get(".").unwrap().id(), ca);
        assert_eq!(root.get("sub1").unwrap().id(), s1);
        assert_eq!(root.get("./sub1").unwrap().id(), s1);
        assert!(matches!(root.get("sub2"), Err(LookupError::NoField { .. })));
        assert_eq!(root.get("[type1]").unwrap().id(), vt1);
        assert_eq!(root.get("[type1]///").unwrap().id(), vt1);
        assert_eq!(root.get("[vnt_flag=type1]").unwrap().id(), vt1);
        assert_eq!(root.get("[type1]/vnt1_1/vnt1_1_1").unwrap().id(), leaf);
        assert_eq!(root.get("[type2]//shared").unwrap().id(), shared2);
        assert!(matches!(root.get("[type9]"), Err(LookupError::NoChoice { .. })));
        assert!(matches!(s.arg(s1).get("sub1"), Err(LookupError::NoField { .. })));
        assert!(matches!(s.arg(s1).get("[type1]"), Err(LookupError::NoVariants { .. })));

        let wrapped = s.wrap(s1);
        assert_eq!(s.arg(wrapped).get("sub1").unwrap().id(), s1);
        let wrapped = s.wrap(ca);
        assert_eq!(s.arg(wrapped).get("base[type1]").unwrap().id(), vt1);
        assert_eq!(s.arg(wrapped).get("base[type2]//shared").unwrap().id(), shared2);
    }

    #[test]
    fn cascaded_variants_need_explicit_flags() {
        let mut s = Schema::new();
        let base = s.add_argument(Argument::new("base", [Dtype::Dict])).unwrap();
        let v1 = s.add_subvariant(base, Variant::new("vnt_flag")).unwrap();
        let vt3 = s.add_choice(v1, Argument::new("type3", [Dtype::Dict])).unwrap();
        let f1 = s.add_subvariant(vt3, Variant::new("vnt3_flag1")).unwrap();
        let f1t1 = s.add_choice(f1, Argument::new("v3f1t1", [Dtype::Dict])).unwrap();
        let f1t1s2 = s.add_subfield(f1t1, Argument::new("v3f1t1_2", [Dtype::Int])).unwrap();
        let f2 = s.add_subvariant(vt3, Variant::new("vnt3_flag2")).unwrap();
        let f2t2 = s.add_choice(f2, Argument::new("v3f2t2", [Dtype::Dict])).unwrap();
        let f2t2s1 = s.add_subfield(f2t2, Argument::new("v3f2t2_1", [Dtype::Int])).unwrap();

        assert_eq!(s.arg(base).get("[type3][vnt3_flag1=v3f1t1]").unwrap().id(), f1t1);
        let wrapped = s.wrap(base);
        let top = s.arg(wrapped);
        assert_eq!(top.get("base[type3][vnt3_flag1=v3f1t1]/v3f1t1_2").unwrap().id(), f1t1s2);
        assert_eq!(top.get("base[type3][vnt3_flag2=v3f2t2]/v3f2t2_1").unwrap().id(), f2t2s1);
        assert!(matches!(top.get("base[type3][v3f2t2]"), Err(LookupError::AmbiguousFlag { count: 2, .. })));
        assert!(matches!(
            top.get("base[type3][vnt3_flag3=v3f2t2]/v3f2t2_1"),
            Err(LookupError::NoVariant { .. })
        ));
    }
}
