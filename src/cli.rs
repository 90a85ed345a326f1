//! CLI: check payloads against a schema file, export it (json-schema | doc), or annotate payloads
use std::collections::HashSet;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use serde_json::Value;

use json_args::annotate;
use json_args::{ArgId, ArgRef, DocOptions, NormalizeError, NormalizeOptions, Schema, TrimPattern};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// validate and normalize JSON documents against a declarative argument schema
#[derive(Parser, Debug)]
#[command(name = "json-args", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// normalize then check every input document
    Check(CheckCmd),
    /// export the schema as a JSON Schema (draft 2020-12) document
    JsonSchema(JsonSchemaCmd),
    /// render reStructuredText documentation for the schema
    Doc(DocCmd),
    /// render input documents as HTML with every known key annotated
    Annotate(AnnotateCmd),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document; every output is checked on its own
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns or '-' for stdin
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct CheckCmd {
    /// schema declaration file (.json)
    #[arg(long, short)]
    schema: PathBuf,

    #[command(flatten)]
    input_settings: InputSettings,

    /// allow keys the schema does not define
    #[arg(long)]
    no_strict: bool,

    /// keys matching this pattern are dropped before checking
    #[arg(long, default_value = "_*")]
    trim: String,

    /// read --trim as a regular expression instead of a glob
    #[arg(long)]
    regex: bool,

    /// keep every key
    #[arg(long)]
    no_trim: bool,

    /// write each normalized document into this directory
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct JsonSchemaCmd {
    /// schema declaration file (.json)
    #[arg(long, short)]
    schema: PathBuf,

    /// `$id` of the generated schema
    #[arg(long, default_value = "")]
    id: String,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct DocCmd {
    /// schema declaration file (.json)
    #[arg(long, short)]
    schema: PathBuf,

    /// emit an HTML anchor before every node
    #[arg(long)]
    anchors: bool,

    /// output .rst file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct AnnotateCmd {
    /// schema declaration file (.json)
    #[arg(long, short)]
    schema: PathBuf,

    #[command(flatten)]
    input_settings: InputSettings,

    /// output .html file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

/// One payload pulled out of the inputs.
#[derive(Debug)]
struct Document {
    label: String,
    source: PathBuf,
    /// position within the source when it yields several payloads
    index: Option<usize>,
    value: Value,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        for source_path in resolve_file_path_patterns(&self.input)? {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = read_source(&source_path)
                .with_context(|| format!("failed to read source file {source_path_str}"))?;
            let parsed = if self.ndjson {
                source
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(serde_json::from_str::<Value>)
                    .collect::<Result<Vec<_>, _>>()
            } else {
                serde_json::from_str::<Value>(&source).map(|x| vec![x])
            };
            let parsed = parsed.with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;

            let mut values = Vec::new();
            for json_value in parsed {
                let json_value = match self.json_pointer.as_deref() {
                    None => json_value,
                    Some(pointer) => json_value
                        .pointer(pointer)
                        .cloned()
                        .ok_or_else(|| anyhow!("JSON pointer `{pointer}` selects nothing in {source_path_str}"))?,
                };
                match self.jq_expr.as_deref() {
                    None => values.push(json_value),
                    Some(jq_expr) => values.extend(
                        json_args::jq_exec::run_jaq(jq_expr, &json_value).with_context(|| {
                            format!("failed to apply jq expression to source file ({source_path_str})")
                        })?,
                    ),
                }
            }

            let many = values.len() > 1;
            documents.extend(values.into_iter().enumerate().map(|(index, value)| Document {
                label: if many { format!("{source_path_str}#{index}") } else { source_path_str.clone() },
                source: source_path.clone(),
                index: many.then_some(index),
                value,
            }));
        }
        tracing::debug!(documents = documents.len(), "inputs loaded");
        Ok(documents)
    }
}

impl CheckCmd {
    fn normalize_options(&self) -> Result<NormalizeOptions> {
        let options = NormalizeOptions::default();
        if self.no_trim {
            return Ok(options);
        }
        let pattern = if self.regex { TrimPattern::regex(&self.trim)? } else { TrimPattern::glob(&self.trim)? };
        Ok(options.trim(pattern))
    }

    fn run(&self) -> Result<ExitCode> {
        let (schema, root) = load_schema(&self.schema)?;
        let arg = schema.arg(root);
        let options = self.normalize_options()?;
        let strict = !self.no_strict;
        let documents = self.input_settings.load()?;

        let outcomes = documents
            .par_iter()
            .map(|doc| validate(arg, &doc.value, &options, strict))
            .collect::<Vec<_>>();

        let mut failures = 0;
        let mut written = HashSet::new();
        for (doc, outcome) in documents.iter().zip(outcomes) {
            match outcome {
                Ok(normalized) => {
                    println!("{} {}", "✅ pass".green(), doc.label);
                    if let Some(dir) = self.out.as_ref() {
                        let out = normalized_path(dir, &doc.source, doc.index);
                        if !written.insert(out.clone()) {
                            bail!("{} would overwrite the normalized output {}", doc.label, out.display());
                        }
                        write_normalized(&out, &normalized)?;
                    }
                }
                Err(error) => {
                    failures += 1;
                    println!("{} {}: {error}", "❌ fail".red(), doc.label);
                }
            }
        }
        let summary = format!("{} passed, {failures} failed", documents.len() - failures);
        if failures == 0 {
            eprintln!("{}", summary.green().bold());
            Ok(ExitCode::SUCCESS)
        } else {
            eprintln!("{}", summary.red().bold());
            Ok(ExitCode::FAILURE)
        }
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }
    pub fn run(&self) -> Result<ExitCode> {
        match &self.cmd {
            Command::Check(target) => target.run(),
            Command::JsonSchema(target) => {
                let (schema, root) = load_schema(&target.schema)?;
                let json_schema = json_args::generate_json_schema(schema.arg(root), &target.id);
                let src = serde_json::to_string_pretty(&json_schema)?;
                emit(target.out.as_deref(), &src)?;
                Ok(ExitCode::SUCCESS)
            }
            Command::Doc(target) => {
                let (schema, root) = load_schema(&target.schema)?;
                let options = DocOptions { make_anchor: target.anchors };
                emit(target.out.as_deref(), &schema.arg(root).gen_doc(&options))?;
                Ok(ExitCode::SUCCESS)
            }
            Command::Annotate(target) => {
                let (schema, root) = load_schema(&target.schema)?;
                let documents = target.input_settings.load()?;
                emit(target.out.as_deref(), &annotate_page(schema.arg(root), &documents))?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn validate(arg: ArgRef<'_>, value: &Value, options: &NormalizeOptions, strict: bool) -> Result<Value, NormalizeError> {
    let normalized = arg.normalize_value(value, options)?;
    arg.check_value(&normalized, strict)?;
    Ok(normalized)
}

fn annotate_page(arg: ArgRef<'_>, documents: &[Document]) -> String {
    let mut page = String::from(annotate::CSS);
    for doc in documents {
        page.push_str(&format!("<h3><code>{}</code></h3>\n", annotate::escape(&doc.label)));
        page.push_str(&arg.annotate_block(&doc.value));
        page.push('\n');
    }
    page
}

fn load_schema(path: &Path) -> Result<(Schema, ArgId)> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file {}", path.display()))?;
    let loaded = json_args::decl::load_str(&source)
        .with_context(|| format!("invalid schema file {}", path.display()))?;
    let (schema, root) = &loaded;
    tracing::debug!(schema = %path.display(), root = schema.arg(*root).name(), "schema loaded");
    Ok(loaded)
}

fn read_source(path: &Path) -> std::io::Result<String> {
    if path == Path::new("-") {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        return Ok(source);
    }
    std::fs::read_to_string(path)
}

/// Where a document's normalized form lands under `dir`. The source's
/// directories are kept, so `a/x.json` and `b/x.json` stay apart.
fn normalized_path(dir: &Path, source: &Path, index: Option<usize>) -> PathBuf {
    let mut rel = PathBuf::new();
    if source != Path::new("-") {
        rel.extend(source.components().filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        }));
    }
    let stem = match rel.file_stem() {
        Some(stem) => stem.to_string_lossy().to_string(),
        None => "stdin".to_string(),
    };
    rel.set_file_name(match index {
        Some(index) => format!("{stem}.{index}.json"),
        None => format!("{stem}.json"),
    });
    dir.join(rel)
}

fn write_normalized(out: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("failed to write {}", out.display()))?;
    Ok(())
}

fn emit(out: Option<&Path>, src: &str) -> Result<()> {
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, src).with_context(|| format!("failed to write {}", out.display()))?;
        }
        None => println!("{src}"),
    }
    Ok(())
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{' ))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                matched_any = true;
                out.push(entry?);
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_check_flags() {
        let cli = CommandLineInterface::try_parse_from([
            "json-args", "check", "--schema", "s.json", "-i", "a.json", "b/*.json", "--no-strict", "--regex", "--trim", "^_.*",
        ])
        .unwrap();
        let Command::Check(cmd) = cli.cmd else { panic!("expected check") };
        assert!(cmd.no_strict && cmd.regex && !cmd.no_trim);
        assert_eq!(cmd.input_settings.input, ["a.json", "b/*.json"]);
        assert_eq!(cmd.normalize_options().unwrap().trim.unwrap().as_str(), "^_.*");
    }

    #[test]
    fn default_trim_is_underscore_glob() {
        let cli = CommandLineInterface::try_parse_from(["json-args", "check", "-s", "s.json", "-i", "a.json"]).unwrap();
        let Command::Check(cmd) = cli.cmd else { panic!("expected check") };
        let trim = cmd.normalize_options().unwrap().trim.unwrap();
        assert!(trim.is_match("_comment"));
        assert!(!trim.is_match("comment"));
    }

    #[test]
    fn validate_normalizes_before_checking() {
        let (schema, root) = json_args::decl::load_str(
            r#"{"name": "base", "dtype": "dict", "sub_fields": [
                {"name": "a", "dtype": "int", "alias": ["aa"]},
                {"name": "b", "dtype": "str", "optional": true, "default": "x"}
            ]}"#,
        )
        .unwrap();
        let options = NormalizeOptions::default().trim(TrimPattern::glob("_*").unwrap());
        let out = validate(schema.arg(root), &json!({"aa": 1, "_note": "hi"}), &options, true).unwrap();
        assert_eq!(out, json!({"a": 1, "b": "x"}));

        let err = validate(schema.arg(root), &json!({"a": 1, "c": 2}), &options, true).unwrap_err();
        assert!(matches!(err, NormalizeError::Argument(e) if e.is_key()));
        assert!(validate(schema.arg(root), &json!({"a": 1, "c": 2}), &options, false).is_ok());
    }

    #[test]
    fn normalized_outputs_keep_source_directories() {
        let out = Path::new("out");
        assert_eq!(normalized_path(out, Path::new("a/x.json"), None), Path::new("out/a/x.json"));
        assert_eq!(normalized_path(out, Path::new("b/x.json"), None), Path::new("out/b/x.json"));
        assert_eq!(normalized_path(out, Path::new("./a/x.json"), None), Path::new("out/a/x.json"));
        assert_eq!(normalized_path(out, Path::new("../runs/x.ndjson"), Some(2)), Path::new("out/runs/x.2.json"));
        assert_eq!(normalized_path(out, Path::new("-"), None), Path::new("out/stdin.json"));
        assert_eq!(normalized_path(out, Path::new("-"), Some(0)), Path::new("out/stdin.0.json"));
    }

    #[test]
    fn same_file_name_in_two_directories_writes_both() {
        let root = std::env::temp_dir().join(format!("json-args-cli-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        for dir in ["a", "b"] {
            std::fs::create_dir_all(root.join(dir)).unwrap();
        }
        let schema = root.join("schema.json");
        std::fs::write(&schema, r#"{"name": "base", "dtype": "dict", "sub_fields": [{"name": "n", "dtype": "int"}]}"#).unwrap();
        std::fs::write(root.join("a/x.json"), r#"{"n": 1}"#).unwrap();
        std::fs::write(root.join("b/x.json"), r#"{"n": 2}"#).unwrap();

        let parse = |inputs: [PathBuf; 2]| {
            let mut argv = vec!["json-args".into(), "check".into(), "-s".into(), schema.to_string_lossy().to_string()];
            argv.push("-i".into());
            argv.extend(inputs.iter().map(|p| p.to_string_lossy().to_string()));
            argv.extend(["--out".into(), root.join("out").to_string_lossy().to_string()]);
            let Command::Check(cmd) = CommandLineInterface::try_parse_from(argv).unwrap().cmd else { panic!("expected check") };
            cmd
        };

        let cmd = parse([root.join("a/x.json"), root.join("b/x.json")]);
        cmd.run().unwrap();
        let first = normalized_path(&root.join("out"), &root.join("a/x.json"), None);
        let second = normalized_path(&root.join("out"), &root.join("b/x.json"), None);
        let read = |p: &Path| serde_json::from_str::<Value>(&std::fs::read_to_string(p).unwrap()).unwrap();
        assert_eq!(read(&first), json!({"n": 1}));
        assert_eq!(read(&second), json!({"n": 2}));

        // one file named twice lands on one output path
        let cmd = parse([root.join("a/x.json"), root.join("a/./x.json")]);
        let err = cmd.run().unwrap_err();
        assert!(err.to_string().contains("would overwrite"));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn annotate_page_labels_each_document() {
        let cli = CommandLineInterface::try_parse_from(["json-args", "annotate", "-s", "s.json", "-i", "a.json", "-o", "a.html"]).unwrap();
        let Command::Annotate(cmd) = cli.cmd else { panic!("expected annotate") };
        assert_eq!(cmd.out.as_deref(), Some(Path::new("a.html")));

        let (schema, root) = json_args::decl::load_str(
            r#"{"name": "base", "dtype": "dict", "sub_fields": [{"name": "n", "dtype": "int", "doc": "how many widgets"}]}"#,
        )
        .unwrap();
        let documents = ["a.json#0", "a.json#1"].map(|label| Document {
            label: label.to_string(),
            source: PathBuf::from("a.json"),
            index: None,
            value: json!({"n": 1}),
        });
        let page = annotate_page(schema.arg(root), &documents);
        assert!(page.starts_with(annotate::CSS));
        assert!(page.contains("<h3><code>a.json#1</code></h3>"));
        assert_eq!(page.matches(r#"<div class="jargs-codeblock">"#).count(), 2);
        assert_eq!(page.matches("how many widgets").count(), 2);
    }

    #[test]
    fn literal_paths_pass_through() {
        let paths = resolve_file_path_patterns(["x.json", "-"]).unwrap();
        assert_eq!(paths, [PathBuf::from("x.json"), PathBuf::from("-")]);
        assert!(resolve_file_path_patterns(["/definitely/not/here/*.json"]).is_err());
    }
}
