//! Module downloading
//!
//! This module handles:
//! - Detection: normalizing shorthand addresses into tagged fetch-addresses
//! - Transfer: dispatching on the getter tag (git, http(s), s3, gcs, file)
//! - Sub-directory selection inside the downloaded package
//!
//! ## Module Organization
//!
//! - `detect.rs`: shorthand detectors
//! - `git.rs`: libgit2 clones with `?ref=`/`?depth=`
//! - `http.rs`: HTTP archives and `X-Terraform-Get` indirection
//! - `object_store.rs`: anonymous S3/GCS downloads
//! - `file.rs`: local directories and archive files
//! - `archive.rs`: decompressors
//! - `subdir.rs`: sub-directory glob expansion

pub mod archive;
pub mod detect;
pub mod file;
pub mod git;
pub mod http;
pub mod object_store;
pub mod subdir;

use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use url::Url;

use crate::config::Settings;
use crate::error::{IngestError, Result};
use crate::registry::credentials::Credentials;
use crate::source::{forced_getter, split_addr_subdir};

pub use detect::detect;
pub use subdir::subdir_glob;

use http::HttpOutcome;
use object_store::Store;

/// `X-Terraform-Get` indirections followed before giving up
const MAX_SOURCE_HOPS: usize = 8;

/// Fetches module packages
pub trait Downloader: Send + Sync {
    /// Detect `address` and split it into the resolved fetch-address and a sub-directory
    fn fetch(&self, address: &str, pwd: &Path) -> Result<(String, String)>;

    /// Download a resolved fetch-address into `dest`, returning the package root
    fn transfer(&self, resolved: &str, dest: &Path) -> Result<PathBuf>;

    /// Detect, transfer and select the sub-directory in one step
    fn download(&self, address: &str, dest: &Path) -> Result<PathBuf> {
        let (resolved, subdir) = self.fetch(address, dest)?;
        let root = self.transfer(&resolved, dest)?;
        subdir_glob(&root, &subdir)
    }
}

/// Detect `address`, keeping any sub-directory the detector itself produced
pub fn resolve_address(address: &str, pwd: &Path) -> Result<(String, String)> {
    let (repo, subdir) = split_addr_subdir(address);
    let detected = detect(&repo, pwd)?;
    let (resolved, detected_subdir) = split_addr_subdir(&detected);
    let subdir = match (detected_subdir.is_empty(), subdir.is_empty()) {
        (true, _) => subdir,
        (false, true) => detected_subdir,
        (false, false) => format!("{detected_subdir}/{subdir}"),
    };
    Ok((resolved, subdir))
}

/// The network-backed downloader
pub struct RemoteDownloader {
    client: Client,
    credentials: Credentials,
}

impl RemoteDownloader {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tfingest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(
            client,
            Credentials::load(settings.cli_config.as_deref()),
        ))
    }

    pub fn with_client(client: Client, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    fn transfer_hop(&self, resolved: &str, dest: &Path, hops: usize) -> Result<PathBuf> {
        if hops > MAX_SOURCE_HOPS {
            return Err(IngestError::TransferFailed {
                address: resolved.to_string(),
                reason: "too many source redirects".to_string(),
            });
        }

        let (forced, rest) = forced_getter(resolved);
        let tag = match forced {
            Some(tag) => tag.to_ascii_lowercase(),
            None => Url::parse(rest)
                .map(|u| u.scheme().to_string())
                .map_err(|e| IngestError::InvalidAddress {
                    address: resolved.to_string(),
                    reason: e.to_string(),
                })?,
        };
        tracing::debug!(address = %resolved, getter = %tag, "transferring");

        match tag.as_str() {
            "git" | "ssh" => git::transfer(rest, dest)?,
            "http" | "https" => {
                match http::transfer(&self.client, &self.credentials, rest, dest)? {
                    HttpOutcome::Unpacked => {}
                    HttpOutcome::Redirect(next) => {
                        let (next, subdir) = resolve_address(&next, dest)?;
                        let root = self.transfer_hop(&next, dest, hops + 1)?;
                        return subdir_glob(&root, &subdir);
                    }
                }
            }
            "s3" => object_store::transfer(&self.client, &self.credentials, Store::S3, rest, dest)?,
            "gcs" => object_store::transfer(&self.client, &self.credentials, Store::Gcs, rest, dest)?,
            "file" => file::transfer(rest, dest)?,
            other => {
                return Err(IngestError::UnsupportedGetter {
                    getter: other.to_string(),
                });
            }
        }
        Ok(dest.to_path_buf())
    }
}

impl Downloader for RemoteDownloader {
    fn fetch(&self, address: &str, pwd: &Path) -> Result<(String, String)> {
        resolve_address(address, pwd)
    }

    fn transfer(&self, resolved: &str, dest: &Path) -> Result<PathBuf> {
        self.transfer_hop(resolved, dest, 0)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_address_keeps_subdir() {
        let (resolved, subdir) =
            resolve_address("github.com/org/repo//modules/vpc?ref=v1", Path::new("/")).expect("detects");
        assert_eq!(resolved, "git::https://github.com/org/repo.git?ref=v1");
        assert_eq!(subdir, "modules/vpc");
    }

    #[test]
    fn test_resolve_address_joins_detected_subdir() {
        let (resolved, subdir) =
            resolve_address("github.com/org/repo/modules//vpc", Path::new("/")).expect("detects");
        assert_eq!(resolved, "git::https://github.com/org/repo.git");
        assert_eq!(subdir, "modules/vpc");
    }

    #[test]
    fn test_resolved_address_is_stable() {
        let (resolved, _) =
            resolve_address("github.com/org/repo//modules/vpc", Path::new("/")).expect("detects");
        let (again, subdir) = resolve_address(&resolved, Path::new("/")).expect("detects");
        assert_eq!(again, resolved);
        assert!(subdir.is_empty());
    }

    #[test]
    fn test_download_local_directory_with_subdir() {
        let src = TempDir::new().expect("temp");
        fs::create_dir_all(src.path().join("modules/vpc")).expect("mkdir");
        fs::write(src.path().join("modules/vpc/main.tf"), "").expect("write");

        let downloader = RemoteDownloader::with_client(Client::new(), Credentials::default());
        let dest = TempDir::new().expect("temp");
        let address = format!("{}//modules/vpc", src.path().display());
        let dir = downloader
            .download(&address, &dest.path().join("pkg"))
            .expect("download");
        assert!(dir.join("main.tf").is_file());
    }

    #[test]
    fn test_unsupported_getter() {
        let downloader = RemoteDownloader::with_client(Client::new(), Credentials::default());
        let dest = TempDir::new().expect("temp");
        let err = downloader
            .transfer("hg::https://example.com/repo", dest.path())
            .expect_err("unsupported");
        assert!(matches!(err, IngestError::UnsupportedGetter { .. }));
    }
}
