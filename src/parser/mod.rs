//! Terraform directory parsing
//!
//! This module handles:
//! - Recognizing configuration directories (at least one `*.tf` file)
//! - Parsing every `*.tf` file of a directory with `hcl-edit`
//! - Collecting resources, variables, locals, module calls and the
//!   `terraform` block into one [`Module`]
//!
//! A file that fails to parse contributes an error diagnostic; the module is
//! absent only when no file parsed. Duplicate declarations keep the first and
//! produce a warning.

pub mod convert;

use std::fs;
use std::path::{Path, PathBuf};

use hcl_edit::structure::{Block, Body, Structure};
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{IngestError, Result};

pub use convert::{SourceText, body_to_values, expr_to_value};

/// Meta-arguments of a module call that are not input variables
const MODULE_META_ARGS: [&str; 6] = ["source", "version", "count", "for_each", "providers", "depends_on"];

/// One `resource "<type>" "<name>"` block
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBlock {
    pub kind: String,
    pub name: String,
    pub file: PathBuf,
    pub line: usize,
    /// Attribute body as a generic value tree
    pub config: Value,
    /// Line numbers, same shape as `config`
    pub lines: Value,
    /// The block exactly as written, comments included
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub default: Option<Value>,
    pub file: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub name: String,
    pub value: Value,
    pub file: PathBuf,
}

/// A `module "<name>"` block
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleCall {
    pub name: String,
    pub source: String,
    pub version: Option<String>,
    /// Input arguments, meta-arguments excluded
    pub args: IndexMap<String, Value>,
    pub file: PathBuf,
    pub line: usize,
}

/// Entry of `terraform { required_providers { .. } }`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderRequirement {
    pub source: Option<String>,
    pub version: Option<String>,
}

/// Everything declared by the configuration files of one directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub dir: PathBuf,
    pub resources: Vec<ResourceBlock>,
    pub variables: IndexMap<String, Variable>,
    pub locals: IndexMap<String, Local>,
    pub module_calls: IndexMap<String, ModuleCall>,
    pub required_providers: IndexMap<String, ProviderRequirement>,
    pub required_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A problem found while parsing a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub severity: Severity,
    pub file: PathBuf,
    pub message: String,
}

impl ParseDiagnostic {
    fn error(file: &Path, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            file: file.to_path_buf(),
            message: message.into(),
        }
    }

    fn warning(file: &Path, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            file: file.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.message)
    }
}

fn is_config_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".tf") && !name.starts_with('.') && !name.starts_with('#') && path.is_file()
}

/// Configuration files of `dir`, sorted by name
pub fn config_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| crate::error::io_error(dir, &e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_config_file(path))
        .collect();
    files.sort();
    Ok(files)
}

/// Whether `dir` holds at least one configuration file
pub fn is_config_dir(dir: &Path) -> bool {
    config_files(dir).is_ok_and(|files| !files.is_empty())
}

/// Parse every configuration file of `dir`
pub fn parse_dir(dir: &Path) -> (Option<Module>, Vec<ParseDiagnostic>) {
    let mut diagnostics = Vec::new();
    let files = match config_files(dir) {
        Ok(files) => files,
        Err(e) => return (None, vec![ParseDiagnostic::error(dir, e.to_string())]),
    };

    let mut module = Module {
        dir: dir.to_path_buf(),
        ..Module::default()
    };
    let mut parsed_any = false;

    for file in &files {
        let text = match fs::read_to_string(file) {
            Ok(text) => text,
            Err(e) => {
                diagnostics.push(ParseDiagnostic::error(file, e.to_string()));
                continue;
            }
        };
        match hcl_edit::parser::parse_body(&text) {
            Ok(body) => {
                parsed_any = true;
                collect_body(&mut module, &body, file, SourceText::new(&text), &mut diagnostics);
            }
            Err(e) => diagnostics.push(ParseDiagnostic::error(file, e.to_string())),
        }
    }

    if parsed_any {
        tracing::debug!(
            dir = %dir.display(),
            resources = module.resources.len(),
            modules = module.module_calls.len(),
            "parsed configuration directory"
        );
        (Some(module), diagnostics)
    } else {
        (None, diagnostics)
    }
}

/// Parse a single configuration string as if it were the only file of `dir`
pub fn parse_str(dir: &Path, file: &Path, text: &str) -> Result<(Module, Vec<ParseDiagnostic>)> {
    let body = hcl_edit::parser::parse_body(text).map_err(|e| IngestError::ParseFailed {
        path: file.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut module = Module {
        dir: dir.to_path_buf(),
        ..Module::default()
    };
    let mut diagnostics = Vec::new();
    collect_body(&mut module, &body, file, SourceText::new(text), &mut diagnostics);
    Ok((module, diagnostics))
}

fn collect_body(
    module: &mut Module,
    body: &Body,
    file: &Path,
    src: SourceText<'_>,
    diagnostics: &mut Vec<ParseDiagnostic>,
) {
    for structure in body.iter() {
        let Structure::Block(block) = structure else {
            continue;
        };
        let labels: Vec<&str> = block.labels.iter().map(|l| l.as_str()).collect();
        match (block.ident.value().as_str(), labels.as_slice()) {
            ("resource", [kind, name]) => {
                if module
                    .resources
                    .iter()
                    .any(|r| r.kind == *kind && r.name == *name)
                {
                    diagnostics.push(ParseDiagnostic::warning(
                        file,
                        format!("duplicate resource \"{kind}.{name}\""),
                    ));
                    continue;
                }
                let (config, lines) = body_to_values(&block.body, src);
                module.resources.push(ResourceBlock {
                    kind: (*kind).to_string(),
                    name: (*name).to_string(),
                    file: file.to_path_buf(),
                    line: src.line_of(block),
                    config,
                    lines,
                    text: src.slice(block).map(str::to_string).unwrap_or_default(),
                });
            }
            ("variable", [name]) => {
                if module.variables.contains_key(*name) {
                    diagnostics.push(ParseDiagnostic::warning(
                        file,
                        format!("duplicate variable \"{name}\""),
                    ));
                    continue;
                }
                let default = block
                    .body
                    .get_attribute("default")
                    .map(|attr| expr_to_value(&attr.value, src));
                module.variables.insert(
                    (*name).to_string(),
                    Variable {
                        name: (*name).to_string(),
                        default,
                        file: file.to_path_buf(),
                    },
                );
            }
            ("locals", []) => collect_locals(module, block, file, src, diagnostics),
            ("module", [name]) => collect_module_call(module, block, name, file, src, diagnostics),
            ("terraform", []) => collect_terraform(module, &block.body, src),
            _ => {}
        }
    }
}

fn collect_locals(
    module: &mut Module,
    block: &Block,
    file: &Path,
    src: SourceText<'_>,
    diagnostics: &mut Vec<ParseDiagnostic>,
) {
    for attr in block.body.attributes() {
        let name = attr.key.value().as_str();
        if module.locals.contains_key(name) {
            diagnostics.push(ParseDiagnostic::warning(
                file,
                format!("duplicate local value \"{name}\""),
            ));
            continue;
        }
        module.locals.insert(
            name.to_string(),
            Local {
                name: name.to_string(),
                value: expr_to_value(&attr.value, src),
                file: file.to_path_buf(),
            },
        );
    }
}

fn collect_module_call(
    module: &mut Module,
    block: &Block,
    name: &str,
    file: &Path,
    src: SourceText<'_>,
    diagnostics: &mut Vec<ParseDiagnostic>,
) {
    if module.module_calls.contains_key(name) {
        diagnostics.push(ParseDiagnostic::warning(
            file,
            format!("duplicate module call \"{name}\""),
        ));
        return;
    }
    let Some(source) = block
        .body
        .get_attribute("source")
        .and_then(|attr| convert::literal_string(&attr.value, src))
    else {
        diagnostics.push(ParseDiagnostic::error(
            file,
            format!("module \"{name}\" has no literal source"),
        ));
        return;
    };
    let version = block
        .body
        .get_attribute("version")
        .and_then(|attr| convert::literal_string(&attr.value, src));

    let args = block
        .body
        .attributes()
        .filter(|attr| !MODULE_META_ARGS.contains(&attr.key.value().as_str()))
        .map(|attr| (attr.key.value().as_str().to_string(), expr_to_value(&attr.value, src)))
        .collect();

    module.module_calls.insert(
        name.to_string(),
        ModuleCall {
            name: name.to_string(),
            source,
            version,
            args,
            file: file.to_path_buf(),
            line: src.line_of(block),
        },
    );
}

fn collect_terraform(module: &mut Module, body: &Body, src: SourceText<'_>) {
    if let Some(attr) = body.get_attribute("required_version") {
        module.required_version = convert::literal_string(&attr.value, src);
    }

    for block in body.get_blocks("required_providers") {
        for attr in block.body.attributes() {
            let requirement = match expr_to_value(&attr.value, src) {
                // Legacy form: `aws = "~> 3.0"`
                Value::String(version) => ProviderRequirement {
                    source: None,
                    version: Some(version),
                },
                Value::Object(fields) => ProviderRequirement {
                    source: fields.get("source").and_then(Value::as_str).map(str::to_string),
                    version: fields.get("version").and_then(Value::as_str).map(str::to_string),
                },
                _ => ProviderRequirement::default(),
            };
            module
                .required_providers
                .entry(attr.key.value().as_str().to_string())
                .or_insert(requirement);
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, text: &str) {
        fs::write(dir.join(name), text).expect("write fixture");
    }

    #[test]
    fn test_is_config_dir() {
        let temp = TempDir::new().expect("temp dir");
        assert!(!is_config_dir(temp.path()));
        write(temp.path(), "notes.txt", "hello");
        write(temp.path(), ".hidden.tf", "");
        assert!(!is_config_dir(temp.path()));
        write(temp.path(), "main.tf", "");
        assert!(is_config_dir(temp.path()));
    }

    #[test]
    fn test_parse_dir_collects_declarations() {
        let temp = TempDir::new().expect("temp dir");
        write(
            temp.path(),
            "main.tf",
            r#"
terraform {
  required_version = ">= 0.13"
  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = "~> 3.0"
    }
    google = "3.5.0"
  }
}

variable "region" {
  default = "us-east-1"
}

variable "untyped" {}

locals {
  prefix = "${var.region}-app"
}

module "network" {
  source  = "./network"
  cidr    = "10.0.0.0/16"
  count   = 1
}

resource "aws_s3_bucket" "logs" {
  bucket = local.prefix
}
"#,
        );

        let (module, diagnostics) = parse_dir(temp.path());
        let module = module.expect("module parsed");
        assert!(diagnostics.is_empty(), "{diagnostics:?}");

        assert_eq!(module.required_version.as_deref(), Some(">= 0.13"));
        assert_eq!(
            module.required_providers["aws"],
            ProviderRequirement {
                source: Some("hashicorp/aws".to_string()),
                version: Some("~> 3.0".to_string()),
            }
        );
        assert_eq!(module.required_providers["google"].version.as_deref(), Some("3.5.0"));
        assert_eq!(module.variables["region"].default, Some(json!("us-east-1")));
        assert_eq!(module.variables["untyped"].default, None);
        assert_eq!(module.locals["prefix"].value, json!("${var.region}-app"));

        let call = &module.module_calls["network"];
        assert_eq!(call.source, "./network");
        assert_eq!(call.args.keys().collect::<Vec<_>>(), vec!["cidr"]);

        let resource = &module.resources[0];
        assert_eq!(resource.kind, "aws_s3_bucket");
        assert_eq!(resource.line, 29);
        assert_eq!(resource.config, json!({"bucket": "${local.prefix}"}));
        assert!(resource.text.starts_with("resource \"aws_s3_bucket\""));
        assert!(resource.text.trim_end().ends_with('}'));
    }

    #[test]
    fn test_bad_file_keeps_good_ones() {
        let temp = TempDir::new().expect("temp dir");
        write(temp.path(), "a.tf", "resource \"null_resource\" \"x\" {}\n");
        write(temp.path(), "b.tf", "resource \"broken\" {{{\n");

        let (module, diagnostics) = parse_dir(temp.path());
        assert_eq!(module.expect("module parsed").resources.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error());
    }

    #[test]
    fn test_no_parseable_file_means_no_module() {
        let temp = TempDir::new().expect("temp dir");
        write(temp.path(), "main.tf", "this is = = not hcl {\n");
        let (module, diagnostics) = parse_dir(temp.path());
        assert!(module.is_none());
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn test_duplicates_warn_and_keep_first() {
        let temp = TempDir::new().expect("temp dir");
        write(
            temp.path(),
            "main.tf",
            "variable \"a\" {\n  default = 1\n}\nvariable \"a\" {\n  default = 2\n}\n",
        );
        let (module, diagnostics) = parse_dir(temp.path());
        let module = module.expect("module parsed");
        assert_eq!(module.variables["a"].default, Some(json!(1)));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
    }
}
