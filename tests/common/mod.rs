//! Common test utilities for tfingest integration tests

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use tfingest::error::{IngestError, Result};
use tfingest::getter::Downloader;
use tfingest::registry::{ModuleRegistry, StaticProviderVersions};
use tfingest::source::{RegistryModule, split_addr_subdir};
use tfingest::{DirectoryLoader, Settings};

/// A scan root plus a separate download area
#[allow(dead_code)]
pub struct TestWorkspace {
    /// Temporary directory
    #[allow(dead_code)]
    pub temp: TempDir,
    /// Path to the scan root
    pub path: PathBuf,
    /// Parent directory for module downloads
    pub downloads: PathBuf,
}

impl TestWorkspace {
    /// Create a new test workspace
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let base = fs::canonicalize(temp.path()).expect("Failed to canonicalize temp directory");
        let path = base.join("scan");
        let downloads = base.join("downloads");
        fs::create_dir_all(&path).expect("Failed to create scan root");
        fs::create_dir_all(&downloads).expect("Failed to create download area");
        Self {
            temp,
            path,
            downloads,
        }
    }

    /// Write a file under the scan root
    pub fn write_file(&self, path: &str, content: &str) {
        write_file(&self.path.join(path), content);
    }

    /// Write a file outside the scan root, e.g. the content of a remote package
    #[allow(dead_code)]
    pub fn write_package_file(&self, package: &str, path: &str, content: &str) -> PathBuf {
        let root = self.temp.path().join("packages").join(package);
        write_file(&root.join(path), content);
        root
    }

    /// Settings with downloads kept inside the workspace
    #[allow(dead_code)]
    pub fn settings(&self) -> Settings {
        Settings {
            temp_root: self.downloads.clone(),
            cli_config: None,
            ..Settings::default()
        }
    }

    /// Loader that never touches the network
    #[allow(dead_code)]
    pub fn offline_loader(&self, downloader: Arc<FixtureDownloader>, registry: Arc<FixtureRegistry>) -> DirectoryLoader {
        DirectoryLoader::new(self.settings())
            .expect("Failed to build loader")
            .with_downloader(downloader)
            .with_registry(registry)
            .with_provider_versions(Arc::new(StaticProviderVersions(Some("4.0.0".to_string()))))
    }

    /// Entries left in the download area
    #[allow(dead_code)]
    pub fn leftover_downloads(&self) -> usize {
        fs::read_dir(&self.downloads)
            .map(|entries| entries.count())
            .unwrap_or_default()
    }

    /// Get path to the tfingest binary
    #[allow(dead_code)]
    pub fn tfingest_bin() -> PathBuf {
        PathBuf::from(env!("CARGO_BIN_EXE_tfingest"))
    }
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(path, content).expect("Failed to write file");
}

/// Serves remote addresses from local package directories
#[derive(Default)]
pub struct FixtureDownloader {
    packages: HashMap<String, PathBuf>,
    transfers: AtomicUsize,
}

#[allow(dead_code)]
impl FixtureDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(mut self, address: &str, dir: PathBuf) -> Self {
        self.packages.insert(address.to_string(), dir);
        self
    }

    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }
}

impl Downloader for FixtureDownloader {
    fn fetch(&self, address: &str, _pwd: &Path) -> Result<(String, String)> {
        Ok(split_addr_subdir(address))
    }

    fn transfer(&self, resolved: &str, dest: &Path) -> Result<PathBuf> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        let source = self.packages.get(resolved).ok_or_else(|| IngestError::TransferFailed {
            address: resolved.to_string(),
            reason: "no such package".to_string(),
        })?;
        copy_dir(source, dest)?;
        Ok(dest.to_path_buf())
    }
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

/// In-memory module registry
#[derive(Default)]
pub struct FixtureRegistry {
    versions: HashMap<String, Vec<String>>,
}

#[allow(dead_code)]
impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `versions` of `namespace/name/provider`
    pub fn with_module(mut self, path: &str, versions: &[&str]) -> Self {
        self.versions
            .insert(path.to_string(), versions.iter().map(ToString::to_string).collect());
        self
    }

    /// Fetch-address the registry hands out for `path` at `version`
    pub fn location(path: &str, version: &str) -> String {
        format!("git::https://example.com/{path}.git?ref=v{version}")
    }
}

impl ModuleRegistry for FixtureRegistry {
    fn default_host(&self) -> &str {
        "registry.terraform.io"
    }

    fn is_registry_host(&self, _host: &str) -> Result<bool> {
        Ok(true)
    }

    fn versions(&self, module: &RegistryModule) -> Result<Vec<String>> {
        self.versions
            .get(&module.module_path())
            .cloned()
            .ok_or_else(|| IngestError::ModuleNotFound {
                module: module.module_path(),
                host: self.default_host().to_string(),
            })
    }

    fn location(&self, module: &RegistryModule, version: &str) -> Result<String> {
        Ok(Self::location(&module.module_path(), version))
    }
}
