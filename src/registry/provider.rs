//! Latest published provider versions, cached per scan

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{IngestError, Result};

/// Source of the newest published version of a provider
pub trait ProviderVersionSource: Send + Sync {
    fn latest(&self, namespace: &str, provider_type: &str) -> Result<String>;
}

/// Caches provider lookups keyed by `<namespace>/<type>-<tool version>`.
///
/// A failed lookup is cached as well: the error is returned once, later calls
/// for the same provider yield `Ok(None)` without another request.
pub struct ProviderVersionCache {
    source: Arc<dyn ProviderVersionSource>,
    terraform_version: String,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl ProviderVersionCache {
    pub fn new(source: Arc<dyn ProviderVersionSource>, terraform_version: impl Into<String>) -> Self {
        Self {
            source,
            terraform_version: terraform_version.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn latest(&self, namespace: &str, provider_type: &str) -> Result<Option<String>> {
        let key = format!("{namespace}/{provider_type}-{}", self.terraform_version);
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(hit.clone());
        }

        let result = self.source.latest(namespace, provider_type);
        let cached = result.as_ref().ok().cloned();
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, cached);

        match result {
            Ok(version) => {
                tracing::debug!(provider = provider_type, version = %version, "latest provider version");
                Ok(Some(version))
            }
            Err(e @ IngestError::ProviderVersion { .. }) => Err(e),
            Err(e) => Err(IngestError::ProviderVersion {
                provider: format!("{namespace}/{provider_type}"),
                reason: e.to_string(),
            }),
        }
    }
}

/// A fixed answer for every provider, used for offline scans and tests
pub struct StaticProviderVersions(pub Option<String>);

impl ProviderVersionSource for StaticProviderVersions {
    fn latest(&self, namespace: &str, provider_type: &str) -> Result<String> {
        self.0.clone().ok_or_else(|| IngestError::ProviderVersion {
            provider: format!("{namespace}/{provider_type}"),
            reason: "provider version lookups are disabled".to_string(),
        })
    }
}
