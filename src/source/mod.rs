//! Module source handling
//!
//! This module handles parsing and classifying module call sources:
//! - Local directory paths: `./modules/vpc`, `../shared`
//! - Registry addresses: `hashicorp/consul/aws`, `app.terraform.io/org/vpc/aws//sub`
//! - Everything else is a remote fetch-address handed to the downloader
//!
//! ## Module Organization
//!
//! - `address.rs`: fetch-address splitting and local detection
//! - `registry_addr.rs`: registry address grammar

pub mod address;
pub mod registry_addr;

use std::fmt;

pub use address::{
    forced_getter, is_local_source_addr, source_addr_and_version, split_addr_subdir,
};
pub use registry_addr::RegistryModule;

/// A classified module call source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// Path relative to the directory of the calling file
    Local(String),
    /// Registry address, resolved through the registry client
    Registry(RegistryModule),
    /// Any other address, fetched by the downloader
    Remote(String),
}

impl ModuleSource {
    /// Classify a declared `source` string
    pub fn classify(source: &str) -> Self {
        let source = source.trim();
        if is_local_source_addr(source) {
            return ModuleSource::Local(source.to_string());
        }
        match RegistryModule::parse(source) {
            Ok(module) => ModuleSource::Registry(module),
            Err(_) => ModuleSource::Remote(source.to_string()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ModuleSource::Local(_))
    }
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSource::Local(path) => write!(f, "{path}"),
            ModuleSource::Registry(module) => write!(f, "{module}"),
            ModuleSource::Remote(addr) => write!(f, "{addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert!(ModuleSource::classify("./vpc").is_local());
        assert!(matches!(
            ModuleSource::classify("hashicorp/consul/aws"),
            ModuleSource::Registry(_)
        ));
        assert!(matches!(
            ModuleSource::classify("github.com/org/repo"),
            ModuleSource::Remote(_)
        ));
        assert!(matches!(
            ModuleSource::classify("git::https://example.com/vpc.git?ref=v1"),
            ModuleSource::Remote(_)
        ));
    }
}
