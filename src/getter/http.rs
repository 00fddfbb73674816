//! HTTP(S) transfers
//!
//! A URL whose path ends in an archive extension (or that carries
//! `?archive=<ext>`) is downloaded and decompressed. Any other URL is asked
//! for the real source location: the `X-Terraform-Get` response header, or a
//! `<meta name="terraform-get" content="...">` tag in an HTML body.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder};
use url::Url;

use crate::error::{IngestError, Result, io_error, transfer_failed};
use crate::registry::credentials::Credentials;
use crate::source::forced_getter;

use super::archive::{ArchiveKind, decompress};

pub const TERRAFORM_GET_HEADER: &str = "X-Terraform-Get";

#[allow(clippy::expect_used)]
static META_TERRAFORM_GET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s+name="terraform-get"\s+content="([^"]+)""#)
        .expect("meta tag regex is valid")
});

/// What an HTTP transfer produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpOutcome {
    /// The archive was unpacked into the destination
    Unpacked,
    /// The server pointed at another source address
    Redirect(String),
}

/// Attach a bearer token for the URL's host when one is configured
pub fn authorized(request: RequestBuilder, credentials: &Credentials, url: &Url) -> RequestBuilder {
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => return request,
    };
    match credentials.token_for(&host) {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// Split `?archive=` off the URL, falling back to the path extension
pub fn archive_kind(url: &mut Url) -> Result<Option<ArchiveKind>> {
    let mut explicit = None;
    let rest: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(k, v)| {
            if k == "archive" {
                explicit = Some(v.into_owned());
                None
            } else {
                Some((k.into_owned(), v.into_owned()))
            }
        })
        .collect();

    let Some(name) = explicit else {
        return Ok(ArchiveKind::from_path(url.path()));
    };
    if rest.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(rest);
    }
    if name == "false" {
        return Ok(None);
    }
    ArchiveKind::from_name(&name)
        .map(Some)
        .ok_or_else(|| transfer_failed(url.as_str(), format!("unknown archive format '{name}'")))
}

/// GET `url` into the file at `path`
pub fn download_to_file(client: &Client, credentials: &Credentials, url: &Url, path: &Path) -> Result<()> {
    tracing::info!(url = %url, "downloading");
    let mut response = authorized(client.get(url.clone()), credentials, url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(IngestError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let mut out = File::create(path).map_err(|e| io_error(path, &e))?;
    io::copy(&mut response, &mut out).map_err(|e| transfer_failed(url.as_str(), e))?;
    Ok(())
}

/// Download and unpack an archive URL into `dest`
pub fn fetch_archive(
    client: &Client,
    credentials: &Credentials,
    url: &Url,
    kind: ArchiveKind,
    dest: &Path,
) -> Result<()> {
    let staging = tempfile::Builder::new()
        .prefix("tfingest-archive-")
        .tempdir()
        .map_err(|e| transfer_failed(url.as_str(), e))?;
    let name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("archive");
    let file = staging.path().join(name);
    download_to_file(client, credentials, url, &file)?;
    decompress(kind, &file, dest)
}

/// Transfer an `http`/`https` address into `dest`
pub fn transfer(client: &Client, credentials: &Credentials, address: &str, dest: &Path) -> Result<HttpOutcome> {
    let mut url = Url::parse(address).map_err(|e| IngestError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;

    if let Some(kind) = archive_kind(&mut url)? {
        fetch_archive(client, credentials, &url, kind, dest)?;
        return Ok(HttpOutcome::Unpacked);
    }

    let mut probe = url.clone();
    probe.query_pairs_mut().append_pair("terraform-get", "1");
    tracing::debug!(url = %probe, "looking up module source");
    let response = authorized(client.get(probe.clone()), credentials, &url).send()?;
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
    let source = match header {
        Some(source) => source,
        None => {
            let body = response.text()?;
            META_TERRAFORM_GET
                .captures(&body)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| transfer_failed(address, "no source URL was returned"))?
        }
    };

    Ok(HttpOutcome::Redirect(resolve_relative(&url, &source)))
}

/// Resolve a returned source against the URL that produced it
pub fn resolve_relative(base: &Url, source: &str) -> String {
    let source = source.trim();
    let (forced, rest) = forced_getter(source);
    if forced.is_some() || Url::parse(rest).is_ok_and(|u| u.scheme().len() > 1) {
        return source.to_string();
    }
    if source.starts_with('/') || source.starts_with("./") || source.starts_with("../") {
        if let Ok(joined) = base.join(source) {
            return joined.to_string();
        }
    }
    source.to_string()
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_kind_from_query() {
        let mut url = Url::parse("https://example.com/download?archive=tar.gz&x=1").expect("url");
        assert_eq!(archive_kind(&mut url).expect("kind"), Some(ArchiveKind::TarGz));
        assert_eq!(url.as_str(), "https://example.com/download?x=1");
    }

    #[test]
    fn test_archive_kind_from_extension() {
        let mut url = Url::parse("https://example.com/modules/vpc.zip").expect("url");
        assert_eq!(archive_kind(&mut url).expect("kind"), Some(ArchiveKind::Zip));
        let mut url = Url::parse("https://example.com/modules/vpc").expect("url");
        assert_eq!(archive_kind(&mut url).expect("kind"), None);
    }

    #[test]
    fn test_unknown_archive_format() {
        let mut url = Url::parse("https://example.com/x?archive=rar").expect("url");
        assert!(archive_kind(&mut url).is_err());
    }

    #[test]
    fn test_resolve_relative() {
        let base = Url::parse("https://registry.example.com/v1/modules/a/b/c/1.0.0/download")
            .expect("url");
        assert_eq!(
            resolve_relative(&base, "/archives/c-1.0.0.tar.gz"),
            "https://registry.example.com/archives/c-1.0.0.tar.gz"
        );
        assert_eq!(
            resolve_relative(&base, "git::https://github.com/a/b.git?ref=v1.0.0"),
            "git::https://github.com/a/b.git?ref=v1.0.0"
        );
        assert_eq!(
            resolve_relative(&base, "github.com/a/b"),
            "github.com/a/b"
        );
    }

    #[test]
    fn test_meta_tag_pattern() {
        let body = r#"<html><head><meta name="terraform-get" content="git::https://example.com/x.git"></head></html>"#;
        let caps = META_TERRAFORM_GET.captures(body).expect("match");
        assert_eq!(&caps[1], "git::https://example.com/x.git");
    }
}
