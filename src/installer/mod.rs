//! Remote module installation
//!
//! This module handles:
//! - Downloading remote modules into fresh temporary directories
//! - Caching downloads per resolved address, so one address transfers once per scan
//! - Resolving registry modules to a version and download location
//! - Removing every directory it created on [`ModuleInstaller::clean_up`]
//!
//! Cache lookup and insert happen under one lock. Concurrent requests for the
//! same resolved address share one cell; the first caller transfers while the
//! others block on the cell and then observe the same directory.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::{Result, transfer_failed};
use crate::getter::{Downloader, subdir_glob};
use crate::registry::{ModuleRegistry, resolve_module};
use crate::source::RegistryModule;

type TransferCell = Arc<OnceLock<std::result::Result<PathBuf, String>>>;

/// A module materialized on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModule {
    /// Directory holding the module's configuration files
    pub dir: PathBuf,
    /// Root of the downloaded package
    pub package_root: PathBuf,
    /// Fetch-address the package was downloaded from
    pub resolved_address: String,
    /// Sub-directory of the package, empty for the root
    pub subdir: String,
    /// Registry version, when the module came from a registry
    pub version: Option<String>,
}

/// Downloads and caches remote modules for one scan
pub struct ModuleInstaller {
    downloader: Arc<dyn Downloader>,
    registry: Arc<dyn ModuleRegistry>,
    temp_root: PathBuf,
    cache: Mutex<HashMap<String, TransferCell>>,
    created: Mutex<Vec<PathBuf>>,
}

impl ModuleInstaller {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        registry: Arc<dyn ModuleRegistry>,
        temp_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloader,
            registry,
            temp_root: temp_root.into(),
            cache: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &dyn ModuleRegistry {
        self.registry.as_ref()
    }

    /// Download the module at `address`, reusing an earlier download of the same resolved address
    pub fn download_remote_module(&self, address: &str) -> Result<InstalledModule> {
        let (resolved, subdir) = self.downloader.fetch(address, &self.temp_root)?;

        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(cache.entry(resolved.clone()).or_default())
        };

        let outcome = cell.get_or_init(|| self.transfer_fresh(&resolved).map_err(|e| e.to_string()));
        let package_root = match outcome {
            Ok(dir) => dir.clone(),
            Err(reason) => return Err(transfer_failed(&resolved, reason)),
        };

        let dir = subdir_glob(&package_root, &subdir)?;
        Ok(InstalledModule {
            dir,
            package_root,
            resolved_address: resolved,
            subdir,
            version: None,
        })
    }

    fn transfer_fresh(&self, resolved: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.temp_root)?;
        #[allow(deprecated)]
        let dest = tempfile::Builder::new()
            .prefix("tfingest-")
            .rand_bytes(6)
            .tempdir_in(&self.temp_root)?
            .into_path();
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(dest.clone());

        tracing::info!(address = %resolved, dest = %dest.display(), "downloading remote module");
        self.downloader.transfer(resolved, &dest)
    }

    /// Whether `module` lives on a host that answers as a module registry
    pub fn is_registry_module(&self, module: &RegistryModule) -> Result<bool> {
        match &module.host {
            None => Ok(true),
            Some(host) => self.registry.is_registry_host(host),
        }
    }

    /// Resolve a registry module against `constraint` and download it
    pub fn install_registry_module(
        &self,
        module: &RegistryModule,
        constraint: Option<&str>,
    ) -> Result<InstalledModule> {
        let resolved = resolve_module(self.registry.as_ref(), module, constraint)?;
        let mut installed = self.download_remote_module(&resolved.location)?;
        if !module.submodule.is_empty() {
            installed.dir = subdir_glob(&installed.dir, &module.submodule)?;
            installed.subdir = if installed.subdir.is_empty() {
                module.submodule.clone()
            } else {
                format!("{}/{}", installed.subdir, module.submodule)
            };
        }
        installed.version = Some(resolved.version);
        Ok(installed)
    }

    /// Successful downloads as `(resolved address, package root)` pairs
    pub fn installed(&self) -> Vec<(String, PathBuf)> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|(address, cell)| match cell.get() {
                Some(Ok(dir)) => Some((address.clone(), dir.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of distinct downloads started
    pub fn download_count(&self) -> usize {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Remove every directory created by this installer; later calls do nothing
    pub fn clean_up(&self) {
        let dirs = std::mem::take(&mut *self.created.lock().unwrap_or_else(PoisonError::into_inner));
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        for dir in dirs {
            match fs::remove_dir_all(&dir) {
                Ok(()) => tracing::debug!(dir = %dir.display(), "removed module download"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "failed to remove module download"),
            }
        }
    }
}

/// Runs [`ModuleInstaller::clean_up`] when dropped, including on early return
pub struct CleanupGuard<'a>(pub &'a ModuleInstaller);

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.0.clean_up();
    }
}

/// Whether `path` lies inside a directory created by a download
pub fn provenance<'a>(installed: &'a [(String, PathBuf)], path: &Path) -> Option<&'a (String, PathBuf)> {
    installed
        .iter()
        .filter(|(_, root)| path.starts_with(root))
        .max_by_key(|(_, root)| root.components().count())
}

impl std::fmt::Debug for ModuleInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInstaller")
            .field("temp_root", &self.temp_root)
            .field("downloads", &self.download_count())
            .finish_non_exhaustive()
    }
}
