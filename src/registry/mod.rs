//! Module registry access
//!
//! This module handles:
//! - Registry discovery and the module versions/download endpoints
//! - Version constraint matching and selection
//! - CLI config credentials for registry hosts
//! - Latest provider versions, cached per scan
//!
//! ## Module Organization
//!
//! - `client.rs`: [`RegistryClient`], the HTTP implementation
//! - `version.rs`: versions, constraints and [`select_version`]
//! - `credentials.rs`: bearer tokens per host
//! - `provider.rs`: [`ProviderVersionCache`]

pub mod client;
pub mod credentials;
pub mod provider;
pub mod version;

pub use client::RegistryClient;
pub use credentials::Credentials;
pub use provider::{ProviderVersionCache, ProviderVersionSource, StaticProviderVersions};
pub use version::{Constraint, parse_version, select_version};

use crate::error::Result;
use crate::source::RegistryModule;

/// The registry operations the installer needs
pub trait ModuleRegistry: Send + Sync {
    /// Host used for three-segment addresses
    fn default_host(&self) -> &str;

    /// Whether `host` answers the discovery probe as a module registry
    fn is_registry_host(&self, host: &str) -> Result<bool>;

    /// Every version string the registry publishes for `module`
    fn versions(&self, module: &RegistryModule) -> Result<Vec<String>>;

    /// Fetch-address of `module` at `version`
    fn location(&self, module: &RegistryModule, version: &str) -> Result<String>;
}

/// A resolved registry module: the chosen version and where to fetch it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub version: String,
    pub location: String,
}

/// Pick a version of `module` satisfying `constraint` and look up its download location
pub fn resolve_module(
    registry: &dyn ModuleRegistry,
    module: &RegistryModule,
    constraint: Option<&str>,
) -> Result<ResolvedModule> {
    let host = module.host_or(registry.default_host()).to_string();
    let versions = registry.versions(module)?;
    let version = select_version(&versions, constraint, &module.module_path(), &host)?;
    let location = registry.location(module, &version)?;
    tracing::debug!(module = %module, version = %version, location = %location, "resolved registry module");
    Ok(ResolvedModule { version, location })
}
