//! Normalized resource records
//!
//! One [`ResourceRecord`] is produced per resource block of the unified config
//! tree. Records are grouped by resource type in [`ResourcesByType`].

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Resource records keyed by resource type
pub type ResourcesByType = BTreeMap<String, Vec<ResourceRecord>>;

/// A rule suppressed by a `#ts:skip=<rule> [comment]` annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipRule {
    pub rule: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

/// A container declared by a workload resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerImage {
    pub name: String,
    pub image: String,
}

/// One resource block with its resolved configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceRecord {
    /// `<type>.<name>`
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Declaring file relative to the scan root, or a pseudo-URL under the
    /// module's download address
    pub source: String,
    pub line: usize,
    pub module_name: String,
    pub provider_version: String,
    pub language_version: String,
    /// Module directory relative to the scan root, `./` for the root
    pub plan_root: String,
    pub config: Value,
    pub line_config: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skip_rules: Vec<SkipRule>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub min_severity: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub max_severity: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub container_images: Vec<ContainerImage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub init_container_images: Vec<ContainerImage>,
}

impl ResourceRecord {
    /// Whether `other` describes the same resource from the same place
    pub fn is_duplicate_of(&self, other: &ResourceRecord) -> bool {
        self.id == other.id && self.source == other.source && self.config == other.config
    }
}
