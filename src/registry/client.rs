//! HTTP client for the module registry protocol
//!
//! - Discovery: `GET <scheme>://<host>/.well-known/terraform.json`, key `modules.v1`
//! - Versions: `GET <base><ns>/<name>/<provider>/versions`
//! - Location: `GET <base><ns>/<name>/<provider>/<version>/download`, answered
//!   with an `X-Terraform-Get` header or a `{"location": ...}` body
//! - Provider versions: `GET <scheme>://<host>/v1/providers/<ns>/<type>/versions`
//!
//! Discovery results are cached per host for the lifetime of the client.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use url::Url;

use crate::config::Settings;
use crate::error::{IngestError, Result};
use crate::getter::http::{TERRAFORM_GET_HEADER, authorized, resolve_relative};
use crate::source::RegistryModule;

use super::credentials::Credentials;
use super::provider::ProviderVersionSource;
use super::version::parse_version;
use super::ModuleRegistry;

const DISCOVERY_PATH: &str = ".well-known/terraform.json";
const DEFAULT_MODULES_BASE: &str = "/v1/modules/";
const TERRAFORM_VERSION_HEADER: &str = "X-Terraform-Version";

#[derive(Debug, Deserialize)]
struct Discovery {
    #[serde(rename = "modules.v1")]
    modules_v1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModuleVersions {
    #[serde(default)]
    modules: Vec<ModuleVersionList>,
}

#[derive(Debug, Deserialize)]
struct ModuleVersionList {
    #[serde(default)]
    versions: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    version: String,
}

#[derive(Debug, Deserialize)]
struct DownloadLocation {
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderVersions {
    #[serde(default)]
    versions: Vec<ProviderVersionEntry>,
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ProviderVersionEntry {
    version: String,
    #[serde(default)]
    #[allow(dead_code)]
    protocols: Vec<String>,
}

/// Registry protocol client shared by module and provider lookups
pub struct RegistryClient {
    client: Client,
    credentials: Credentials,
    scheme: String,
    default_host: String,
    terraform_version: String,
    discovery: Mutex<HashMap<String, Option<String>>>,
}

impl RegistryClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tfingest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(
            client,
            Credentials::load(settings.cli_config.as_deref()),
            settings,
        ))
    }

    pub fn with_client(client: Client, credentials: Credentials, settings: &Settings) -> Self {
        Self {
            client,
            credentials,
            scheme: settings.registry_scheme.clone(),
            default_host: settings.registry_host.clone(),
            terraform_version: settings.terraform_version.clone(),
            discovery: Mutex::new(HashMap::new()),
        }
    }

    fn host_url(&self, host: &str) -> Result<Url> {
        Url::parse(&format!("{}://{host}/", self.scheme)).map_err(|e| IngestError::InvalidAddress {
            address: host.to_string(),
            reason: e.to_string(),
        })
    }

    /// Module API base for `host`; `Ok(None)` when the host is not a module registry
    pub fn discover(&self, host: &str) -> Result<Option<String>> {
        let key = host.to_ascii_lowercase();
        if let Some(cached) = self
            .discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(cached.clone());
        }

        let url = self.host_url(host)?.join(DISCOVERY_PATH).map_err(|e| IngestError::InvalidAddress {
            address: host.to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(url = %url, "discovering registry services");
        let response = authorized(self.client.get(url.clone()), &self.credentials, &url).send()?;

        let base = if response.status().is_success() {
            match response.json::<Discovery>() {
                Ok(doc) => doc.modules_v1,
                Err(e) => {
                    tracing::debug!(host, error = %e, "discovery document is not valid JSON");
                    None
                }
            }
        } else {
            None
        };

        self.discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, base.clone());
        Ok(base)
    }

    fn modules_base(&self, host: &str) -> Result<Url> {
        // The configured public registry is trusted without a discovery document
        let base = match self.discover(host)? {
            Some(base) => base,
            None if host.eq_ignore_ascii_case(&self.default_host) => {
                DEFAULT_MODULES_BASE.to_string()
            }
            None => {
                return Err(IngestError::NotARegistry {
                    host: host.to_string(),
                });
            }
        };
        let base = if base.ends_with('/') {
            base
        } else {
            format!("{base}/")
        };
        self.host_url(host)?
            .join(&base)
            .map_err(|e| IngestError::InvalidAddress {
                address: host.to_string(),
                reason: e.to_string(),
            })
    }

    fn module_url(&self, module: &RegistryModule, tail: &str) -> Result<Url> {
        let host = module.host_or(&self.default_host);
        let path = format!("{}/{tail}", module.module_path());
        self.modules_base(host)?
            .join(&path)
            .map_err(|e| IngestError::InvalidAddress {
                address: module.to_string(),
                reason: e.to_string(),
            })
    }
}

impl ModuleRegistry for RegistryClient {
    fn default_host(&self) -> &str {
        &self.default_host
    }

    fn is_registry_host(&self, host: &str) -> Result<bool> {
        Ok(self.discover(host)?.is_some())
    }

    fn versions(&self, module: &RegistryModule) -> Result<Vec<String>> {
        let url = self.module_url(module, "versions")?;
        tracing::debug!(url = %url, "listing module versions");
        let response = authorized(self.client.get(url.clone()), &self.credentials, &url).send()?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(IngestError::ModuleNotFound {
                    module: module.module_path(),
                    host: module.host_or(&self.default_host).to_string(),
                });
            }
            status if !status.is_success() => {
                return Err(IngestError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            _ => {}
        }

        let body: ModuleVersions = response.json()?;
        Ok(body
            .modules
            .into_iter()
            .flat_map(|m| m.versions)
            .map(|v| v.version)
            .collect())
    }

    fn location(&self, module: &RegistryModule, version: &str) -> Result<String> {
        let url = self.module_url(module, &format!("{version}/download"))?;
        tracing::debug!(url = %url, "resolving module download location");
        let response = authorized(self.client.get(url.clone()), &self.credentials, &url).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let header = response
            .headers()
            .get(TERRAFORM_GET_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let location = match header {
            Some(location) => Some(location),
            None => response
                .json::<DownloadLocation>()
                .ok()
                .and_then(|body| body.location),
        };

        location
            .filter(|l| !l.trim().is_empty())
            .map(|l| resolve_relative(&url, &l))
            .ok_or_else(|| IngestError::TransferFailed {
                address: module.to_string(),
                reason: format!("failed to get download URL for version {version}"),
            })
    }
}

impl ProviderVersionSource for RegistryClient {
    fn latest(&self, namespace: &str, provider_type: &str) -> Result<String> {
        let url = self
            .host_url(&self.default_host)?
            .join(&format!("v1/providers/{namespace}/{provider_type}/versions"))
            .map_err(|e| IngestError::InvalidAddress {
                address: format!("{namespace}/{provider_type}"),
                reason: e.to_string(),
            })?;
        let response = authorized(self.client.get(url.clone()), &self.credentials, &url)
            .header(TERRAFORM_VERSION_HEADER, &self.terraform_version)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body: ProviderVersions = response.json()?;
        for warning in body.warnings.iter().flatten() {
            tracing::debug!(provider = provider_type, "registry warning: {warning}");
        }

        body.versions
            .iter()
            .filter_map(|entry| {
                parse_version(&entry.version)
                    .ok()
                    .filter(|v| v.pre.is_empty())
                    .map(|v| (v, &entry.version))
            })
            .max_by(|(a, _), (b, _)| super::version::compare(a, b))
            .map(|(_, raw)| raw.trim_start_matches('v').to_string())
            .ok_or_else(|| IngestError::ProviderVersion {
                provider: format!("{namespace}/{provider_type}"),
                reason: "registry returned no versions".to_string(),
            })
    }
}
