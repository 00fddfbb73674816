//! Pre-populated module manifest
//!
//! `terraform init` records every installed module in
//! `<root>/.terraform/modules/modules.json`:
//!
//! ```json
//! {"Modules":[{"Key":"vpc","Source":"terraform-aws-modules/vpc/aws","Version":"3.2.0","Dir":".terraform/modules/vpc"}]}
//! ```
//!
//! `Dir` is relative to the root module.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::DEFAULT_REGISTRY_HOST;
use crate::error::{IngestError, Result};
use crate::registry::{Constraint, parse_version};

pub const MANIFEST_PATH: &str = ".terraform/modules/modules.json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestEntry {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub version: String,
    pub dir: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ManifestFile {
    #[serde(default)]
    modules: Vec<ManifestEntry>,
}

#[derive(Debug, Clone)]
pub struct ModuleManifest {
    root: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl ModuleManifest {
    /// Read the manifest under `root`; `Ok(None)` when there is none
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = root.join(MANIFEST_PATH);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(IngestError::Manifest {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };
        let file: ManifestFile = serde_json::from_str(&text).map_err(|e| IngestError::Manifest {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), modules = file.modules.len(), "loaded module manifest");
        Ok(Some(Self {
            root: root.to_path_buf(),
            entries: file.modules,
        }))
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Directory of an installed module with the same source whose version satisfies `constraint`
    pub fn find(&self, source: &str, constraint: Option<&str>) -> Option<PathBuf> {
        let constraint = match constraint.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => Some(Constraint::parse(c).ok()?),
            None => None,
        };

        self.entries
            .iter()
            .filter(|entry| same_source(&entry.source, source))
            .find(|entry| match &constraint {
                None => true,
                Some(c) => parse_version(&entry.version).is_ok_and(|v| c.matches(&v)),
            })
            .map(|entry| self.root.join(&entry.dir))
    }
}

// Newer manifests spell registry sources with the public registry host
fn same_source(recorded: &str, declared: &str) -> bool {
    let strip = |s: &str| {
        s.strip_prefix(DEFAULT_REGISTRY_HOST)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(s)
            .to_string()
    };
    recorded == declared || strip(recorded) == strip(declared)
}
