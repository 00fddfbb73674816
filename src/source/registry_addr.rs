//! Registry module addresses
//!
//! `[host/]namespace/name/provider[//subdir]`. Three segments refer to the
//! configured public registry; four segments name the registry host first.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, invalid_address};

use super::address::{is_local_source_addr, split_addr_subdir};

#[allow(clippy::expect_used)]
static NAME_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Za-z](?:[0-9A-Za-z_-]{0,62}[0-9A-Za-z])?$").expect("name regex is valid")
});

#[allow(clippy::expect_used)]
static PROVIDER_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-z]{1,64}$").expect("provider regex is valid"));

#[allow(clippy::expect_used)]
static HOST_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:localhost|[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)+)(?::[0-9]{1,5})?$")
        .expect("host regex is valid")
});

/// Hosts that are version control services, never module registries
const VCS_HOSTS: [&str; 2] = ["github.com", "bitbucket.org"];

/// A parsed registry module address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryModule {
    /// Explicit registry host, `None` for the default public registry
    pub host: Option<String>,
    pub namespace: String,
    pub name: String,
    pub provider: String,
    /// Path inside the downloaded module package
    pub submodule: String,
}

impl RegistryModule {
    /// Parse a registry module address
    pub fn parse(addr: &str) -> Result<Self> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(invalid_address(addr, "empty address"));
        }
        if is_local_source_addr(addr) || addr.starts_with('/') {
            return Err(invalid_address(addr, "local path is not a registry address"));
        }
        if addr.contains("::") || addr.contains("://") {
            return Err(invalid_address(addr, "URL is not a registry address"));
        }

        let (package, submodule) = split_addr_subdir(addr);
        if package.contains('?') {
            return Err(invalid_address(addr, "registry address cannot carry a query"));
        }
        let parts: Vec<&str> = package.split('/').collect();

        let (host, rest) = match parts.len() {
            3 => (None, &parts[..]),
            4 => {
                let host = parts[0];
                if !HOST_PART.is_match(host) {
                    return Err(invalid_address(addr, format!("invalid registry host '{host}'")));
                }
                if VCS_HOSTS.contains(&host.to_ascii_lowercase().as_str()) {
                    return Err(invalid_address(
                        addr,
                        format!("'{host}' is a version control host, not a registry"),
                    ));
                }
                (Some(host.to_ascii_lowercase()), &parts[1..])
            }
            _ => {
                return Err(invalid_address(
                    addr,
                    "expected [host/]namespace/name/provider",
                ));
            }
        };

        let (namespace, name, provider) = (rest[0], rest[1], rest[2]);
        if !NAME_PART.is_match(namespace) {
            return Err(invalid_address(addr, format!("invalid namespace '{namespace}'")));
        }
        if !NAME_PART.is_match(name) {
            return Err(invalid_address(addr, format!("invalid module name '{name}'")));
        }
        if !PROVIDER_PART.is_match(provider) {
            return Err(invalid_address(
                addr,
                format!("invalid provider '{provider}'"),
            ));
        }

        Ok(Self {
            host,
            namespace: namespace.to_string(),
            name: name.to_string(),
            provider: provider.to_string(),
            submodule,
        })
    }

    /// Whether `addr` parses as a registry address
    pub fn is_registry_addr(addr: &str) -> bool {
        Self::parse(addr).is_ok()
    }

    /// Registry host, falling back to `default_host`
    pub fn host_or<'a>(&'a self, default_host: &'a str) -> &'a str {
        self.host.as_deref().unwrap_or(default_host)
    }

    /// `namespace/name/provider`, the path below the module API base
    pub fn module_path(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.name, self.provider)
    }
}

impl fmt::Display for RegistryModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(host) = &self.host {
            write!(f, "{host}/")?;
        }
        write!(f, "{}", self.module_path())?;
        if !self.submodule.is_empty() {
            write!(f, "//{}", self.submodule)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_public_registry_address() {
        let module = RegistryModule::parse("hashicorp/consul/aws").expect("valid");
        assert_eq!(module.host, None);
        assert_eq!(module.module_path(), "hashicorp/consul/aws");
        assert_eq!(module.host_or("registry.terraform.io"), "registry.terraform.io");
    }

    #[test]
    fn test_parse_private_registry_with_submodule() {
        let module =
            RegistryModule::parse("app.terraform.io/example-corp/k8s-cluster/azurerm//modules/node")
                .expect("valid");
        assert_eq!(module.host.as_deref(), Some("app.terraform.io"));
        assert_eq!(module.namespace, "example-corp");
        assert_eq!(module.name, "k8s-cluster");
        assert_eq!(module.provider, "azurerm");
        assert_eq!(module.submodule, "modules/node");
        assert_eq!(
            module.to_string(),
            "app.terraform.io/example-corp/k8s-cluster/azurerm//modules/node"
        );
    }

    #[test]
    fn test_parse_localhost_with_port() {
        let module = RegistryModule::parse("localhost:8080/ns/name/aws").expect("valid");
        assert_eq!(module.host.as_deref(), Some("localhost:8080"));
    }

    #[test]
    fn test_rejects_non_registry_addresses() {
        for addr in [
            "./modules/vpc",
            "../vpc",
            "github.com/hashicorp/example",
            "github.com/hashicorp/example/aws",
            "git::https://example.com/vpc.git",
            "https://example.com/vpc.zip",
            "git@github.com:org/repo.git",
            "bucket.s3.amazonaws.com/vpc.zip",
            "hashicorp/consul",
            "hashicorp/consul/AWS",
            "not_a_host/ns/name/aws",
        ] {
            assert!(
                RegistryModule::parse(addr).is_err(),
                "{addr} should not be a registry address"
            );
        }
    }
}
