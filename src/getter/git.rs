//! Git transfers for module sources
//!
//! This module handles:
//! - Cloning repositories (HTTPS, SSH and `file://`)
//! - `?ref=` selection of a branch, tag or commit
//! - `?depth=` shallow clones
//! - Authentication via git's native credential system
//!
//! Authentication is delegated entirely to git's native system:
//! - SSH keys from ~/.ssh/
//! - Git credential helpers
//! - Environment variables (GIT_SSH_COMMAND, etc.)

use std::path::Path;

use git2::{
    Cred, CredentialType, ErrorClass, FetchOptions, RemoteCallbacks, Repository, build::RepoBuilder,
};
use url::Url;

use crate::error::{IngestError, Result};

/// Clone parameters carried in the fetch-address query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRequest {
    pub url: String,
    pub git_ref: Option<String>,
    pub depth: Option<i32>,
}

impl GitRequest {
    /// Split `ref` and `depth` off the query; other parameters stay on the URL
    pub fn parse(address: &str) -> Result<Self> {
        let mut url = Url::parse(address).map_err(|e| IngestError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        let mut git_ref = None;
        let mut depth = None;
        let mut rest = Vec::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "ref" => git_ref = Some(value.into_owned()),
                "depth" => {
                    let parsed = value.parse::<i32>().map_err(|_| IngestError::InvalidAddress {
                        address: address.to_string(),
                        reason: format!("depth must be a number, got '{value}'"),
                    })?;
                    depth = Some(parsed);
                }
                _ => rest.push((key.into_owned(), value.into_owned())),
            }
        }

        if rest.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(rest);
        }

        Ok(Self {
            url: url.to_string(),
            git_ref: git_ref.filter(|r| !r.is_empty()),
            depth: depth.filter(|d| *d > 0),
        })
    }
}

/// Clone `address` into `dest` and check out the requested ref
pub fn transfer(address: &str, dest: &Path) -> Result<()> {
    let request = GitRequest::parse(address)?;
    tracing::info!(url = %request.url, git_ref = ?request.git_ref, "cloning module repository");

    let repo = clone(&request, dest)?;
    if let Some(git_ref) = &request.git_ref {
        // A shallow clone with a ref already checked out the branch
        if request.depth.is_none() {
            let sha = resolve_ref(&repo, git_ref)?;
            checkout_commit(&repo, &sha)?;
        }
    }
    Ok(())
}

/// Interpret a git2 error and provide a more user-friendly message
fn interpret_git_error(err: &git2::Error) -> String {
    let class = err.class();
    let message = err.message().to_lowercase();

    // More specific patterns first
    if message.contains("not found") || message.contains("404") {
        "Repository not found".to_string()
    } else if message.contains("too many redirects") || message.contains("authentication replays") {
        // Usually a missing repository behind an auth prompt
        "Repository not found".to_string()
    } else if message.contains("authentication") || message.contains("credentials") {
        "Authentication failed".to_string()
    } else if message.contains("permission denied") || message.contains("access denied") {
        "Permission denied".to_string()
    } else if message.contains("connection")
        || message.contains("network")
        || message.contains("timeout")
        || message.contains("timed out")
    {
        "Network error".to_string()
    } else if class == ErrorClass::Http {
        if message.contains("certificate") {
            "Certificate error".to_string()
        } else if message.contains("ssl") {
            "SSL error".to_string()
        } else {
            format!("HTTP error: {}", err.message())
        }
    } else if class == ErrorClass::Ssh {
        format!("SSH error: {}", err.message())
    } else {
        err.message().to_string()
    }
}

/// Clone a repository to `target`
///
/// Without a ref the clone is shallow unless a depth was requested. With a ref
/// and a depth, the ref is cloned as a branch like `git clone --branch`.
fn clone(request: &GitRequest, target: &Path) -> Result<Repository> {
    let mut callbacks = RemoteCallbacks::new();
    setup_auth_callbacks(&mut callbacks);

    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);

    // Shallow clones are not supported for local repositories
    let is_local = request.url.starts_with("file://");
    let depth = match (&request.git_ref, request.depth) {
        (_, Some(depth)) => Some(depth),
        (None, None) => Some(1),
        (Some(_), None) => None,
    };
    if let Some(depth) = depth.filter(|_| !is_local) {
        fetch_options.depth(depth);
    }

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_options);
    if let (Some(git_ref), Some(_)) = (&request.git_ref, request.depth) {
        builder.branch(git_ref);
    }

    builder
        .clone(&request.url, target)
        .map_err(|e| IngestError::GitCloneFailed {
            url: request.url.clone(),
            reason: interpret_git_error(&e),
        })
}

/// Resolve a git ref (branch, tag, or SHA) to a full SHA
pub fn resolve_ref(repo: &Repository, refname: &str) -> Result<String> {
    let ref_candidates = [
        refname.to_string(),
        format!("refs/heads/{refname}"),
        format!("refs/tags/{refname}"),
        format!("refs/remotes/origin/{refname}"),
    ];

    for candidate in &ref_candidates {
        if let Ok(reference) = repo.find_reference(candidate) {
            if let Ok(commit) = reference.peel_to_commit() {
                return Ok(commit.id().to_string());
            }
        }
    }

    if let Ok(oid) = git2::Oid::from_str(refname) {
        if let Ok(commit) = repo.find_commit(oid) {
            return Ok(commit.id().to_string());
        }
    }

    // Last resort: abbreviated SHAs and other revspecs
    if let Ok(obj) = repo.revparse_single(refname) {
        if let Ok(commit) = obj.peel_to_commit() {
            return Ok(commit.id().to_string());
        }
    }

    Err(IngestError::GitRefResolveFailed {
        git_ref: refname.to_string(),
        reason: "Could not resolve reference".to_string(),
    })
}

/// Checkout a specific commit with a detached HEAD
pub fn checkout_commit(repo: &Repository, sha: &str) -> Result<()> {
    let checkout_failed = |e: git2::Error| IngestError::GitCheckoutFailed {
        sha: sha.to_string(),
        reason: e.message().to_string(),
    };

    let oid = git2::Oid::from_str(sha).map_err(checkout_failed)?;
    let commit = repo.find_commit(oid).map_err(checkout_failed)?;
    repo.set_head_detached(commit.id()).map_err(checkout_failed)?;

    let mut checkout_builder = git2::build::CheckoutBuilder::new();
    checkout_builder.force();
    repo.checkout_head(Some(&mut checkout_builder))
        .map_err(checkout_failed)?;

    Ok(())
}

/// Set up authentication callbacks for git operations
///
/// This delegates authentication to git's native credential system:
/// - SSH agent, then keys in ~/.ssh/
/// - Git credential helpers
/// - Anonymous access for public repositories
fn setup_auth_callbacks(callbacks: &mut RemoteCallbacks) {
    callbacks.credentials(|url, username_from_url, allowed_types| {
        if allowed_types.contains(CredentialType::DEFAULT) {
            return Cred::default();
        }

        if allowed_types.contains(CredentialType::SSH_KEY) {
            if let Some(username) = username_from_url {
                if let Ok(cred) = Cred::ssh_key_from_agent(username) {
                    return Ok(cred);
                }

                let ssh_dir = dirs::home_dir().unwrap_or_default().join(".ssh");
                for key_name in &["id_ed25519", "id_rsa", "id_ecdsa"] {
                    let private_key = ssh_dir.join(key_name);
                    let public_key = ssh_dir.join(format!("{key_name}.pub"));
                    if !private_key.exists() {
                        continue;
                    }
                    let public_key_path = public_key.exists().then_some(public_key.as_path());
                    if let Ok(cred) = Cred::ssh_key(username, public_key_path, &private_key, None)
                    {
                        return Ok(cred);
                    }
                }
            }
        }

        if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if let Ok(config) = git2::Config::open_default() {
                if let Ok(cred) = Cred::credential_helper(&config, url, username_from_url) {
                    return Ok(cred);
                }
            }
            // Public HTTPS repositories accept an empty login
            if let Ok(cred) = Cred::userpass_plaintext(username_from_url.unwrap_or(""), "") {
                return Ok(cred);
            }
        }

        Err(git2::Error::new(
            git2::ErrorCode::Auth,
            git2::ErrorClass::Http,
            "authentication failed",
        ))
    });
}
