//! Runs the JSON fixture corpus under `fixtures/` against the library.
//!
//! Each fixture file holds one schema declaration and a list of cases:
//!
//! ```json
//! { "schema": { "name": "base", ... },
//!   "cases": [ { "name": "alias", "payload": {...}, "expect": "ok", "output": {...} } ] }
//! ```
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use json_args::decl::{from_str_with_path, ArgumentDecl};
use json_args::{ArgId, ArgRef, ErrorKind, NormalizeError, NormalizeOptions, Schema, TrimPattern};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// run the json-args fixture corpus
#[derive(Parser, Debug)]
struct CommandLineInterface {
    /// directory holding `*.json` fixtures
    #[arg(long, default_value = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures"))]
    fixtures: PathBuf,

    /// only run cases whose `file/case` name matches this regex
    #[arg(long)]
    filter: Option<String>,

    /// print the normalized output of passing cases
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Fixture {
    schema: ArgumentDecl,
    cases: Vec<Case>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Case {
    name: String,
    payload: Value,
    /// `payload` is the bare value of the root rather than `{name: value}`
    #[serde(default)]
    bare: bool,
    #[serde(default = "yes")]
    strict: bool,
    #[serde(default = "yes")]
    normalize: bool,
    #[serde(default)]
    trim: Option<String>,
    expect: Expect,
    /// slash-joined location of the expected error
    #[serde(default)]
    path: Option<String>,
    /// expected normalized payload
    #[serde(default)]
    output: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Expect {
    Ok,
    Key,
    Type,
    Value,
    Trim,
}

fn yes() -> bool {
    true
}

/// What a case actually produced.
#[derive(Debug)]
enum Outcome {
    Ok(Value),
    Failed { expect: Expect, path: Option<String>, message: String },
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Case {
    fn run(&self, arg: ArgRef<'_>) -> Result<Outcome> {
        let options = match self.trim.as_deref() {
            Some(pattern) => NormalizeOptions::default().trim(TrimPattern::glob(pattern)?),
            None => NormalizeOptions::default(),
        };
        let result = || -> Result<Value, NormalizeError> {
            let value = match (self.normalize, self.bare) {
                (false, _) => self.payload.clone(),
                (true, true) => arg.normalize_value(&self.payload, &options)?,
                (true, false) => arg.normalize(&self.payload, &options)?,
            };
            if self.bare {
                arg.check_value(&value, self.strict)?;
            } else {
                arg.check(&value, self.strict)?;
            }
            Ok(value)
        };
        Ok(match result() {
            Ok(value) => Outcome::Ok(value),
            Err(NormalizeError::TrimConflict { .. }) => {
                Outcome::Failed { expect: Expect::Trim, path: None, message: "trim conflict".into() }
            }
            Err(NormalizeError::Argument(error)) => Outcome::Failed {
                expect: match error.kind {
                    ErrorKind::Key => Expect::Key,
                    ErrorKind::Type => Expect::Type,
                    ErrorKind::Value => Expect::Value,
                },
                path: Some(error.path_str()),
                message: error.to_string(),
            },
        })
    }

    /// `None` when the outcome matches, otherwise why not.
    fn verdict(&self, outcome: &Outcome) -> Option<String> {
        match outcome {
            Outcome::Ok(_) if self.expect != Expect::Ok => Some(format!("expected {:?}, got ok", self.expect)),
            Outcome::Ok(value) => match &self.output {
                Some(output) if output != value => Some(format!(
                    "normalized output differs\n  expected: {output}\n  actual:   {value}"
                )),
                _ => None,
            },
            Outcome::Failed { expect, message, .. } if *expect != self.expect => {
                Some(format!("expected {:?}, got {expect:?}: {message}", self.expect))
            }
            Outcome::Failed { path, message, .. } => match (&self.path, path) {
                (Some(want), Some(got)) if want != got => {
                    Some(format!("expected error at `{want}`, got `{got}`: {message}"))
                }
                _ => None,
            },
        }
    }
}

fn load_fixture(path: &Path) -> Result<(Schema, ArgId, Fixture)> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    let fixture: Fixture = from_str_with_path(&source)
        .with_context(|| format!("malformed fixture {}", path.display()))?;
    let mut schema = Schema::new();
    let root = schema
        .load(&fixture.schema)
        .with_context(|| format!("invalid schema in {}", path.display()))?;
    tracing::debug!(fixture = %path.display(), cases = fixture.cases.len(), "fixture loaded");
    Ok((schema, root, fixture))
}

fn run(cli: &CommandLineInterface) -> Result<ExitCode> {
    let filter = cli.filter.as_deref().map(Regex::new).transpose()?;
    let pattern = format!("{}/*.json", cli.fixtures.display());
    let mut paths = glob::glob(&pattern)?.collect::<Result<Vec<_>, _>>()?;
    paths.sort();

    let (mut passed, mut failed) = (0usize, 0usize);
    for path in paths {
        let file = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let (schema, root, fixture) = load_fixture(&path)?;
        for case in &fixture.cases {
            let name = format!("{file}/{}", case.name);
            if filter.as_ref().is_some_and(|re| !re.is_match(&name)) {
                continue;
            }
            let outcome = case.run(schema.arg(root))?;
            match case.verdict(&outcome) {
                None => {
                    passed += 1;
                    println!("{} {name}", "✅".green());
                    if let (true, Outcome::Ok(value)) = (cli.verbose, &outcome) {
                        println!("    {value}");
                    }
                }
                Some(reason) => {
                    failed += 1;
                    println!("{} {name}: {reason}", "❌".red());
                }
            }
        }
    }

    let summary = format!("{passed} passed, {failed} failed");
    if failed == 0 {
        println!("{}", summary.green().bold());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{}", summary.red().bold());
        Ok(ExitCode::FAILURE)
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    run(&CommandLineInterface::parse())
}
