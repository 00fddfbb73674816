//! Source detectors
//!
//! Turn shorthand addresses into fully qualified fetch-addresses carrying a
//! getter tag. Detectors run in order; the first that accepts the address wins:
//! - GitHub: `github.com/org/repo[/sub]` -> `git::https://github.com/org/repo.git[//sub]`
//! - Git SSH: `git@host:org/repo.git` -> `git::ssh://git@host/org/repo.git`
//! - BitBucket: `bitbucket.org/org/repo` -> `git::https://bitbucket.org/org/repo.git`
//! - GCS: `www.googleapis.com/storage/v1/bucket/path` -> `gcs::https://...`
//! - S3: `bucket.s3.amazonaws.com/key`, `s3-region.amazonaws.com/bucket/key` -> `s3::https://...`
//! - File: absolute paths -> `file:///abs/path`
//!
//! Addresses that already carry a scheme are returned unchanged.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{IngestError, Result};
use crate::source::{forced_getter, split_addr_subdir};

#[allow(clippy::expect_used)]
static SCP_SSH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<user>[A-Za-z0-9._-]+)@(?P<host>[A-Za-z0-9.-]+):(?P<path>[^/].*|/.+)$")
        .expect("ssh regex is valid")
});

type Detector = fn(&str, &Path) -> Option<Result<String>>;

const DETECTORS: [Detector; 6] = [
    detect_github,
    detect_git_ssh,
    detect_bitbucket,
    detect_gcs,
    detect_s3,
    detect_file,
];

/// Normalize `src` into a fetch-address with a getter tag.
///
/// A sub-directory on the input is preserved and re-attached after detection.
pub fn detect(src: &str, pwd: &Path) -> Result<String> {
    let (forced, rest) = forced_getter(src);
    let (get_src, sub_dir) = split_addr_subdir(rest);

    if has_scheme(&get_src) {
        return Ok(src.to_string());
    }

    for detector in DETECTORS {
        let Some(result) = detector(&get_src, pwd) else {
            continue;
        };
        let result = result?;

        let (detect_forced, result) = forced_getter(&result);
        let detect_forced = detect_forced.map(str::to_string);
        let (result, detect_sub) = split_addr_subdir(result);

        let sub_dir = match (detect_sub.is_empty(), sub_dir.is_empty()) {
            (true, _) => sub_dir.clone(),
            (false, true) => detect_sub,
            (false, false) => format!("{detect_sub}/{sub_dir}"),
        };
        let result = with_subdir(&result, &sub_dir);

        return Ok(match forced.map(str::to_string).or(detect_forced) {
            Some(getter) => format!("{getter}::{result}"),
            None => result,
        });
    }

    Err(IngestError::DetectionFailed {
        address: src.to_string(),
    })
}

fn has_scheme(src: &str) -> bool {
    match Url::parse(src) {
        // Single letters are Windows drive prefixes
        Ok(url) => url.scheme().len() > 1,
        Err(_) => false,
    }
}

/// Insert `//subdir` before any query string
fn with_subdir(addr: &str, sub_dir: &str) -> String {
    if sub_dir.is_empty() {
        return addr.to_string();
    }
    match addr.split_once('?') {
        Some((base, query)) => format!("{base}//{sub_dir}?{query}"),
        None => format!("{addr}//{sub_dir}"),
    }
}

fn split_query(src: &str) -> (&str, Option<&str>) {
    match src.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (src, None),
    }
}

fn join_query(base: String, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{base}?{q}"),
        _ => base,
    }
}

/// Shared shape of GitHub and BitBucket addresses: `host/owner/repo[/sub...]`
fn detect_git_host(src: &str, host: &str) -> Option<Result<String>> {
    let prefix = format!("{host}/");
    if !src.starts_with(&prefix) {
        return None;
    }
    let (path, query) = split_query(src);
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() < 3 || parts[1].is_empty() || parts[2].is_empty() {
        return Some(Err(IngestError::InvalidAddress {
            address: src.to_string(),
            reason: format!("{host} URLs should be {host}/owner/repo"),
        }));
    }

    let repo = parts[2].strip_suffix(".git").unwrap_or(parts[2]);
    let mut url = format!("https://{host}/{}/{repo}.git", parts[1]);
    if parts.len() > 3 {
        url.push_str("//");
        url.push_str(&parts[3..].join("/"));
    }
    Some(Ok(format!("git::{}", join_query(url, query))))
}

fn detect_github(src: &str, _pwd: &Path) -> Option<Result<String>> {
    detect_git_host(src, "github.com")
}

fn detect_bitbucket(src: &str, _pwd: &Path) -> Option<Result<String>> {
    detect_git_host(src, "bitbucket.org")
}

fn detect_git_ssh(src: &str, _pwd: &Path) -> Option<Result<String>> {
    let caps = SCP_SSH.captures(src)?;
    let user = caps.name("user")?.as_str();
    let host = caps.name("host")?.as_str();
    let path = caps.name("path")?.as_str().trim_start_matches('/');
    Some(Ok(format!("git::ssh://{user}@{host}/{path}")))
}

fn detect_gcs(src: &str, _pwd: &Path) -> Option<Result<String>> {
    if !src.contains("googleapis.com/") {
        return None;
    }
    let (path, query) = split_query(src);
    let parts: Vec<&str> = path.split('/').collect();
    // www.googleapis.com/storage/v1/bucket/object...
    if parts.len() < 5 || parts[1] != "storage" {
        return Some(Err(IngestError::InvalidAddress {
            address: src.to_string(),
            reason: "GCS URLs should be www.googleapis.com/storage/v1/bucket/path".to_string(),
        }));
    }
    Some(Ok(format!("gcs::{}", join_query(format!("https://{path}"), query))))
}

fn detect_s3(src: &str, _pwd: &Path) -> Option<Result<String>> {
    let (path, query) = split_query(src);
    let host = path.split('/').next()?;
    if !host.ends_with(".amazonaws.com") || !host.contains("s3") {
        return None;
    }
    if path.split('/').filter(|p| !p.is_empty()).count() < 2 {
        return Some(Err(IngestError::InvalidAddress {
            address: src.to_string(),
            reason: "S3 URLs should name a bucket and key".to_string(),
        }));
    }
    Some(Ok(format!("s3::{}", join_query(format!("https://{path}"), query))))
}

fn detect_file(src: &str, _pwd: &Path) -> Option<Result<String>> {
    let path = Path::new(src);
    if !path.is_absolute() {
        return None;
    }
    let normalized = src.replace('\\', "/");
    let normalized = normalized.trim_start_matches('/');
    Some(Ok(format!("file:///{normalized}")))
}
