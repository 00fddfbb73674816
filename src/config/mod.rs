//! Scan options and ambient settings
//!
//! This module contains:
//! - [`LoadOptions`] - per-scan switches (`non_recursive`, `use_terraform_cache`, cancellation)
//! - [`Settings`] - registry host, tool version, CLI credentials file and temp root
//!
//! Settings come from `Default`, then environment variables via [`Settings::from_env`].

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

pub const DEFAULT_REGISTRY_HOST: &str = "registry.terraform.io";
pub const DEFAULT_TERRAFORM_VERSION: &str = "0.15.0";

const ENV_REGISTRY_HOST: &str = "TFINGEST_REGISTRY_HOST";
const ENV_TERRAFORM_VERSION: &str = "TFINGEST_TERRAFORM_VERSION";
const ENV_CLI_CONFIG_FILE: &str = "TF_CLI_CONFIG_FILE";

/// Options recognized by a directory scan
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Scan only the root directory instead of every descendant directory
    pub non_recursive: bool,
    /// Prefer `.terraform/modules/modules.json` over live module resolution
    pub use_terraform_cache: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn non_recursive(mut self, value: bool) -> Self {
        self.non_recursive = value;
        self
    }

    pub fn use_terraform_cache(mut self, value: bool) -> Self {
        self.use_terraform_cache = value;
        self
    }

    /// Attach a flag that stops the scan at the next directory or module boundary
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Ambient settings shared by the registry client, installer and walker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Host used for `namespace/name/provider` addresses and provider versions
    pub registry_host: String,
    /// Sent as `X-Terraform-Version`, also the fallback language version
    pub terraform_version: String,
    /// CLI config file holding `credentials "<host>" { token = ... }` blocks
    pub cli_config: Option<PathBuf>,
    /// Parent directory for downloaded modules
    pub temp_root: PathBuf,
    /// URL scheme for registry requests
    pub registry_scheme: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registry_host: DEFAULT_REGISTRY_HOST.to_string(),
            terraform_version: DEFAULT_TERRAFORM_VERSION.to_string(),
            cli_config: default_cli_config(),
            temp_root: temp_dir_base(),
            registry_scheme: "https".to_string(),
        }
    }
}

impl Settings {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(host) = env::var(ENV_REGISTRY_HOST) {
            if !host.trim().is_empty() {
                settings.registry_host = host.trim().to_string();
            }
        }
        if let Ok(version) = env::var(ENV_TERRAFORM_VERSION) {
            if !version.trim().is_empty() {
                settings.terraform_version = version.trim().to_string();
            }
        }
        if let Ok(path) = env::var(ENV_CLI_CONFIG_FILE) {
            if !path.is_empty() {
                settings.cli_config = Some(PathBuf::from(path));
            }
        }
        settings
    }
}

fn default_cli_config() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".terraformrc"))
}

/// Absolute directory under which download directories are created.
/// A relative `TMPDIR` would otherwise place them under the working directory.
pub fn temp_dir_base() -> PathBuf {
    let t = env::temp_dir();
    if t.is_absolute() {
        t
    } else {
        #[cfg(windows)]
        {
            env::var("TEMP")
                .or_else(|_| env::var("TMP"))
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("C:\\Windows\\Temp"))
        }
        #[cfg(not(windows))]
        {
            PathBuf::from("/tmp")
        }
    }
}
