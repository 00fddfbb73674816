//! Directory loading and unified config tree construction
//!
//! This module handles:
//! - Enumerating the directories to scan (the root only, or every non-hidden
//!   descendant in recursive mode)
//! - Parsing each directory and resolving its module calls into child nodes
//!   (local paths, the module manifest, the registry, or remote downloads)
//! - Walking every tree into resource records grouped by type
//! - Collecting per-directory failures next to the records instead of aborting
//!
//! Downloaded modules are removed once loading finishes, including on
//! cancellation and early return.
//!
//! ## Module Organization
//!
//! - `tree.rs`: the arena-backed [`ConfigTree`]
//! - `walker.rs`: breadth-first traversal into resource records
//! - `manifest.rs`: `.terraform/modules/modules.json`

pub mod manifest;
pub mod tree;
pub mod walker;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use walkdir::WalkDir;

use crate::config::{LoadOptions, Settings};
use crate::domain::ResourcesByType;
use crate::error::{AggregateError, DiagnosticSink, DirError, IngestError, Result};
use crate::getter::{Downloader, RemoteDownloader};
use crate::installer::{CleanupGuard, ModuleInstaller};
use crate::parser::{self, ModuleCall, ParseDiagnostic};
use crate::registry::{ModuleRegistry, ProviderVersionCache, ProviderVersionSource, RegistryClient};
use crate::source::ModuleSource;

pub use manifest::ModuleManifest;
pub use tree::{ConfigNode, ConfigTree, NodeId};
pub use walker::TreeWalker;

/// Everything a scan produced
#[derive(Debug, Default)]
pub struct LoadOutput {
    pub resources: ResourcesByType,
    /// Every per-directory failure, `None` when the scan was clean
    pub errors: Option<AggregateError>,
    /// Non-fatal parser diagnostics
    pub warnings: Vec<DirError>,
}

impl LoadOutput {
    pub fn resource_count(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }

    /// The resources, or [`IngestError::Aggregate`] when any directory failed
    pub fn into_result(self) -> Result<ResourcesByType> {
        match self.errors {
            Some(errors) => Err(errors.into()),
            None => Ok(self.resources),
        }
    }
}

/// Loads IaC directories with one set of collaborators
pub struct DirectoryLoader {
    settings: Settings,
    downloader: Arc<dyn Downloader>,
    registry: Arc<dyn ModuleRegistry>,
    provider_versions: Arc<dyn ProviderVersionSource>,
}

impl DirectoryLoader {
    /// Loader backed by the network downloader and registry client
    pub fn new(settings: Settings) -> Result<Self> {
        let downloader = Arc::new(RemoteDownloader::new(&settings)?);
        let registry = Arc::new(RegistryClient::new(&settings)?);
        Ok(Self {
            downloader,
            registry: Arc::clone(&registry) as Arc<dyn ModuleRegistry>,
            provider_versions: registry,
            settings,
        })
    }

    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn ModuleRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_provider_versions(mut self, source: Arc<dyn ProviderVersionSource>) -> Self {
        self.provider_versions = source;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Load `root` and every module it calls into resource records.
    ///
    /// Only a missing or non-directory root fails the whole call; every other
    /// failure is reported in [`LoadOutput::errors`] next to the records that
    /// could be produced.
    pub fn load(&self, root: &Path, options: &LoadOptions) -> Result<LoadOutput> {
        if !root.exists() {
            return Err(IngestError::PathNotFound {
                path: root.display().to_string(),
            });
        }
        if !root.is_dir() {
            return Err(IngestError::NotADirectory {
                path: root.display().to_string(),
            });
        }
        let root = fs::canonicalize(root).map_err(|e| crate::error::io_error(root, &e))?;

        let run = ScanRun::new(self, &root, options);
        let _cleanup = CleanupGuard(&run.installer);

        let dirs = if options.non_recursive {
            vec![root.clone()]
        } else {
            scan_dirs(&root, &run.sink)?
        };

        let mut resources = ResourcesByType::new();
        for dir in dirs {
            if options.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            if !options.non_recursive && !parser::is_config_dir(&dir) {
                tracing::debug!(dir = %dir.display(), "no configuration files, skipping");
                continue;
            }
            if let Some(tree) = run.load_tree(&dir)? {
                run.walk(&tree, &mut resources, !options.non_recursive);
            }
        }

        tracing::info!(
            root = %root.display(),
            resources = resources.values().map(Vec::len).sum::<usize>(),
            downloads = run.installer.download_count(),
            "scan finished"
        );
        Ok(LoadOutput {
            resources,
            errors: run.sink.take_error(),
            warnings: run.sink.take_warnings(),
        })
    }
}

/// Load `root` with settings from the environment
pub fn load_iac_dir(root: &Path, options: &LoadOptions) -> Result<LoadOutput> {
    DirectoryLoader::new(Settings::from_env())?.load(root, options)
}

/// `root` and every descendant directory without a hidden path component.
///
/// A descendant that cannot be read is recorded in `sink` and skipped; only
/// failing to read `root` itself is an error.
fn scan_dirs(root: &Path, sink: &DiagnosticSink) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        });
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => dirs.push(entry.into_path()),
            Ok(_) => {}
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                let dir = e.path().unwrap_or(root).to_path_buf();
                sink.push(&dir, format!("failed to read directory: {e}"));
            }
        }
    }
    Ok(dirs)
}

/// State of one `load` call; caches live exactly as long as the scan
struct ScanRun<'a> {
    loader: &'a DirectoryLoader,
    root: &'a Path,
    options: &'a LoadOptions,
    installer: ModuleInstaller,
    providers: ProviderVersionCache,
    manifest: Option<ModuleManifest>,
    sink: DiagnosticSink,
    versions: AtomicUsize,
}

impl<'a> ScanRun<'a> {
    fn new(loader: &'a DirectoryLoader, root: &'a Path, options: &'a LoadOptions) -> Self {
        let sink = DiagnosticSink::new();
        let manifest = if options.use_terraform_cache {
            match ModuleManifest::load(root) {
                Ok(manifest) => manifest,
                Err(e) => {
                    sink.warn(root, e.to_string());
                    None
                }
            }
        } else {
            None
        };

        Self {
            loader,
            root,
            options,
            installer: ModuleInstaller::new(
                Arc::clone(&loader.downloader),
                Arc::clone(&loader.registry),
                loader.settings.temp_root.clone(),
            ),
            providers: ProviderVersionCache::new(
                Arc::clone(&loader.provider_versions),
                loader.settings.terraform_version.clone(),
            ),
            manifest,
            sink,
            versions: AtomicUsize::new(0),
        }
    }

    /// Unified tree rooted at `dir`, `None` when `dir` has no usable configuration
    fn load_tree(&self, dir: &Path) -> Result<Option<ConfigTree>> {
        let Some(module) = self.parse(dir) else {
            return Ok(None);
        };
        let mut tree = ConfigTree::new(module);
        let root = tree.root();
        self.build_children(&mut tree, root)?;
        Ok(Some(tree))
    }

    fn parse(&self, dir: &Path) -> Option<parser::Module> {
        if !parser::is_config_dir(dir) {
            self.sink.push(
                dir,
                IngestError::NoConfigFiles {
                    path: dir.display().to_string(),
                }
                .to_string(),
            );
            return None;
        }

        let (module, diagnostics) = parser::parse_dir(dir);
        match module {
            Some(module) => {
                for diagnostic in &diagnostics {
                    self.sink.warn(dir, diagnostic.to_string());
                }
                Some(module)
            }
            None => {
                let reasons: Vec<String> = diagnostics.iter().map(ParseDiagnostic::to_string).collect();
                self.sink.push(
                    dir,
                    format!("failed to load terraform config: {}", reasons.join("; ")),
                );
                None
            }
        }
    }

    fn build_children(&self, tree: &mut ConfigTree, id: NodeId) -> Result<()> {
        let calls: Vec<ModuleCall> = tree.node(id).module.module_calls.values().cloned().collect();
        let module_dir = tree.node(id).module.dir.clone();

        for call in calls {
            if self.options.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            let caller_dir = call.file.parent().map_or_else(|| module_dir.clone(), Path::to_path_buf);

            let dir = match self.resolve_source(&call, &caller_dir) {
                Ok(dir) => dir,
                Err(e) => {
                    self.sink.push(
                        &caller_dir,
                        format!("failed to load module \"{}\" from '{}': {e}", call.name, call.source),
                    );
                    continue;
                }
            };
            let dir = fs::canonicalize(&dir).unwrap_or(dir);

            let in_ancestry = std::iter::once(id)
                .chain(tree.ancestors(id))
                .any(|n| tree.node(n).module.dir == dir);
            if in_ancestry {
                self.sink.push(
                    &caller_dir,
                    IngestError::ModuleCycle {
                        path: dir.display().to_string(),
                    }
                    .to_string(),
                );
                continue;
            }

            let Some(module) = self.parse(&dir) else {
                continue;
            };
            let version = format!("1.0.{}", self.versions.fetch_add(1, Ordering::Relaxed));
            tracing::debug!(module = %call.name, dir = %dir.display(), version = %version, "loaded child module");
            let child = tree.add_child(id, call, module, version);
            self.build_children(tree, child)?;
        }
        Ok(())
    }

    /// Local directory holding the module a call points at
    fn resolve_source(&self, call: &ModuleCall, caller_dir: &Path) -> Result<PathBuf> {
        let source = ModuleSource::classify(&call.source);
        if let ModuleSource::Local(path) = &source {
            let dir = caller_dir.join(path);
            if !dir.is_dir() {
                return Err(IngestError::InvalidModuleSource {
                    source_addr: call.source.clone(),
                    reason: format!("'{}' is not a directory", dir.display()),
                });
            }
            return Ok(dir);
        }

        if let Some(dir) = self
            .manifest
            .as_ref()
            .and_then(|m| m.find(&call.source, call.version.as_deref()))
        {
            tracing::debug!(module = %call.name, dir = %dir.display(), "module found in manifest");
            return Ok(dir);
        }

        let installed = match source {
            ModuleSource::Registry(module) if self.installer.is_registry_module(&module)? => {
                self.installer
                    .install_registry_module(&module, call.version.as_deref())?
            }
            _ => self.installer.download_remote_module(&call.source)?,
        };
        Ok(installed.dir)
    }

    fn walk(&self, tree: &ConfigTree, out: &mut ResourcesByType, dedup: bool) {
        let installed: Vec<(String, PathBuf)> = self
            .installer
            .installed()
            .into_iter()
            .map(|(address, dir)| {
                let dir = fs::canonicalize(&dir).unwrap_or(dir);
                (address, dir)
            })
            .collect();

        TreeWalker {
            tree,
            root: self.root,
            installed: &installed,
            providers: &self.providers,
            sink: &self.sink,
            terraform_version: &self.loader.settings.terraform_version,
        }
        .walk(out, dedup);
    }
}
