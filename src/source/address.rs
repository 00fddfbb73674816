//! Fetch-address string handling
//!
//! This module handles:
//! - Local source detection (`./x`, `../x`, `.\x`, `..\x`)
//! - Splitting `address//subdir` into fetch-address and sub-directory
//! - Forced getter prefixes (`git::https://...`)
//! - `address:version` splitting for registry shorthand

use std::sync::LazyLock;

use regex::Regex;

const LOCAL_PREFIXES: [&str; 4] = ["./", "../", ".\\", "..\\"];

#[allow(clippy::expect_used)]
static FORCED_GETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9]+)::(.+)$").expect("forced getter regex is valid"));

/// Whether `addr` names a directory relative to the calling module
pub fn is_local_source_addr(addr: &str) -> bool {
    LOCAL_PREFIXES.iter().any(|prefix| addr.starts_with(prefix))
}

/// Split `addr` into a fetch-address and a sub-directory.
///
/// The first `//` after any `scheme://` separates the two. A query string that
/// follows the sub-directory is moved back onto the fetch-address, so
/// `git::https://h/r.git//modules/vpc?ref=v1` yields
/// `("git::https://h/r.git?ref=v1", "modules/vpc")`.
pub fn split_addr_subdir(addr: &str) -> (String, String) {
    let stop = addr.find('?').unwrap_or(addr.len());
    let offset = addr[..stop].find("://").map_or(0, |idx| idx + 3);

    let Some(idx) = addr[offset..stop].find("//") else {
        return (addr.to_string(), String::new());
    };
    let idx = idx + offset;

    let mut fetch = addr[..idx].to_string();
    let mut subdir = addr[idx + 2..].to_string();
    if let Some(q) = subdir.find('?') {
        fetch.push_str(&subdir[q..]);
        subdir.truncate(q);
    }
    (fetch, subdir)
}

/// Split a forced getter prefix off `addr`: `git::https://x` gives `(Some("git"), "https://x")`
pub fn forced_getter(addr: &str) -> (Option<&str>, &str) {
    match FORCED_GETTER.captures(addr) {
        Some(caps) => match (caps.get(1), caps.get(2)) {
            (Some(getter), Some(rest)) => (Some(getter.as_str()), rest.as_str()),
            _ => (None, addr),
        },
        None => (None, addr),
    }
}

/// Split a trailing `:version` off a registry address.
///
/// `host/ns/name/provider:1.2.0` gives the address and `Some("1.2.0")`. Addresses
/// carrying a scheme or a port-like segment are returned untouched.
pub fn source_addr_and_version(source: &str) -> (String, Option<String>) {
    let source = source.trim();
    if source.contains("://") || source.contains("::") {
        return (source.to_string(), None);
    }
    match source.rsplit_once(':') {
        Some((addr, version)) if !version.is_empty() && !version.contains('/') => {
            (addr.trim().to_string(), Some(version.trim().to_string()))
        }
        _ => (source.to_string(), None),
    }
}
