//! Object-store transfers (`s3::` and `gcs::`)
//!
//! Objects are fetched anonymously over HTTPS. Archives are unpacked into the
//! destination; any other object is stored there under its own name.

use std::fs;
use std::path::Path;

use reqwest::blocking::Client;
use url::Url;

use crate::error::{IngestError, Result, io_error};
use crate::registry::credentials::Credentials;

use super::http::{archive_kind, download_to_file, fetch_archive};

/// Object-store flavour of a fetch-address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    S3,
    Gcs,
}

/// Rewrite a store address into a plain HTTPS download URL
pub fn download_url(store: Store, address: &str) -> Result<Url> {
    let url = Url::parse(address).map_err(|e| IngestError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;

    match store {
        Store::S3 => Ok(url),
        Store::Gcs => {
            // www.googleapis.com/storage/v1/<bucket>/<object> -> storage.googleapis.com/<bucket>/<object>
            let path = url.path().trim_start_matches('/');
            let object = path.strip_prefix("storage/v1/").unwrap_or(path);
            let mut download = Url::parse(&format!("https://storage.googleapis.com/{object}"))
                .map_err(|e| IngestError::InvalidAddress {
                    address: address.to_string(),
                    reason: e.to_string(),
                })?;
            download.set_query(url.query());
            Ok(download)
        }
    }
}

pub fn transfer(
    client: &Client,
    credentials: &Credentials,
    store: Store,
    address: &str,
    dest: &Path,
) -> Result<()> {
    let mut url = download_url(store, address)?;
    if let Some(kind) = archive_kind(&mut url)? {
        return fetch_archive(client, credentials, &url, kind, dest);
    }

    fs::create_dir_all(dest).map_err(|e| io_error(dest, &e))?;
    let name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| IngestError::InvalidAddress {
            address: address.to_string(),
            reason: "object key is empty".to_string(),
        })?;
    let target = dest.join(name);
    download_to_file(client, credentials, &url, &target)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_gcs_download_url() {
        let url = download_url(
            Store::Gcs,
            "https://www.googleapis.com/storage/v1/my-bucket/modules/vpc.zip",
        )
        .expect("url");
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/my-bucket/modules/vpc.zip"
        );
    }

    #[test]
    fn test_s3_download_url_unchanged() {
        let url = download_url(Store::S3, "https://bucket.s3.amazonaws.com/vpc.tgz").expect("url");
        assert_eq!(url.as_str(), "https://bucket.s3.amazonaws.com/vpc.tgz");
    }
}
