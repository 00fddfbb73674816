//! Breadth-first traversal of the config tree into resource records

use std::path::{Path, PathBuf};

use crate::domain::{ResourceRecord, ResourcesByType, annotations, containers};
use crate::error::DiagnosticSink;
use crate::installer::provenance;
use crate::parser::ResourceBlock;
use crate::registry::ProviderVersionCache;
use crate::resolver::RefResolver;

use super::tree::{ConfigNode, ConfigTree, NodeId};

const DEFAULT_PROVIDER_NAMESPACE: &str = "hashicorp";

/// Turns the resources of one config tree into [`ResourceRecord`]s
pub struct TreeWalker<'a> {
    pub(super) tree: &'a ConfigTree,
    pub(super) root: &'a Path,
    /// `(resolved address, package root)` of every downloaded module
    pub(super) installed: &'a [(String, PathBuf)],
    pub(super) providers: &'a ProviderVersionCache,
    pub(super) sink: &'a DiagnosticSink,
    pub(super) terraform_version: &'a str,
}

impl TreeWalker<'_> {
    /// Append a record for every resource; with `dedup`, exact duplicates already in `out` are skipped
    pub fn walk(&self, out: &mut ResourcesByType, dedup: bool) {
        for id in self.tree.breadth_first() {
            let node = self.tree.node(id);
            let resolver = RefResolver::new(self.tree, id, self.root);

            for block in &node.module.resources {
                let record = self.record(id, node, block, &resolver);
                let records = out.entry(record.kind.clone()).or_default();
                if dedup && records.iter().any(|r| r.is_duplicate_of(&record)) {
                    tracing::debug!(id = %record.id, source = %record.source, "skipping duplicate resource");
                    continue;
                }
                records.push(record);
            }
        }
    }

    fn record(&self, id: NodeId, node: &ConfigNode, block: &ResourceBlock, resolver: &RefResolver<'_>) -> ResourceRecord {
        let mut config = block.config.clone();
        resolver.resolve_all(&mut config);

        let (min_severity, max_severity) = annotations::severity_bounds(&block.text);
        let (container_images, init_container_images) = if containers::has_containers(&block.kind) {
            containers::extract(&block.kind, &config, &block.file)
        } else {
            (Vec::new(), Vec::new())
        };

        ResourceRecord {
            id: format!("{}.{}", block.kind, block.name),
            name: block.name.clone(),
            kind: block.kind.clone(),
            source: self.display_path(&block.file),
            line: block.line,
            module_name: node.name.clone(),
            provider_version: self.provider_version(id, &block.kind),
            language_version: node
                .module
                .required_version
                .clone()
                .unwrap_or_else(|| self.terraform_version.to_string()),
            plan_root: if node.is_root() {
                "./".to_string()
            } else {
                self.display_path(&node.module.dir)
            },
            config,
            line_config: block.lines.clone(),
            skip_rules: annotations::skip_rules(&block.text),
            min_severity,
            max_severity,
            container_images,
            init_container_images,
        }
    }

    /// `path` relative to the scan root, or a pseudo-URL under the download address
    fn display_path(&self, path: &Path) -> String {
        if let Ok(relative) = path.strip_prefix(self.root) {
            let relative = relative.display().to_string();
            return if relative.is_empty() { "./".to_string() } else { relative };
        }
        match provenance(self.installed, path) {
            Some((address, package_root)) => {
                let relative = path.strip_prefix(package_root).unwrap_or(path);
                let relative = relative.display().to_string();
                if relative.is_empty() {
                    address.clone()
                } else {
                    format!("{}/{relative}", address.trim_end_matches('/'))
                }
            }
            None => path.display().to_string(),
        }
    }

    /// Declared constraint of the resource's provider stripped of its operator, else the latest published
    fn provider_version(&self, id: NodeId, kind: &str) -> String {
        let local_name = kind.split('_').next().unwrap_or(kind);
        let requirement = std::iter::once(id)
            .chain(self.tree.ancestors(id))
            .find_map(|n| self.tree.node(n).module.required_providers.get(local_name));

        if let Some(version) = requirement.and_then(|r| r.version.as_deref()) {
            return strip_operator(version);
        }

        let (namespace, provider_type) = match requirement.and_then(|r| r.source.as_deref()) {
            Some(source) => provider_from_source(source, local_name),
            None => (DEFAULT_PROVIDER_NAMESPACE.to_string(), local_name.to_string()),
        };
        match self.providers.latest(&namespace, &provider_type) {
            Ok(version) => version.unwrap_or_default(),
            Err(e) => {
                self.sink.push(&self.tree.node(id).module.dir, e.to_string());
                String::new()
            }
        }
    }
}

/// `"~> 3.0"` becomes `"3.0"`; of a compound constraint only the first term is kept
fn strip_operator(constraint: &str) -> String {
    constraint
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_start_matches(['~', '>', '<', '=', '!'])
        .trim()
        .to_string()
}

// `[host/]namespace/type`
fn provider_from_source(source: &str, local_name: &str) -> (String, String) {
    let parts: Vec<&str> = source.split('/').collect();
    match parts.as_slice() {
        [.., namespace, provider_type] => ((*namespace).to_string(), (*provider_type).to_string()),
        _ => (DEFAULT_PROVIDER_NAMESPACE.to_string(), local_name.to_string()),
    }
}
