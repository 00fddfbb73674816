//! Error types and handling for tfingest
//!
//! Uses `thiserror` for error definitions and `miette` for pretty diagnostics.
//!
//! Errors fall into four groups:
//! - per-directory failures (unparseable directory, invalid module source)
//! - per-address failures (malformed address, failed detection or transfer)
//! - run-fatal failures (the scan root cannot be enumerated)
//! - the [`AggregateError`] that carries every per-directory diagnostic of a run
//!
//! Unresolved references never produce an error; they degrade to their literal text.

pub mod aggregate;

pub use aggregate::{AggregateError, DiagnosticSink, DirError};

use miette::Diagnostic;
use thiserror::Error;

/// Main error type for tfingest operations
#[derive(Error, Diagnostic, Debug)]
pub enum IngestError {
    // Scan root errors
    #[error("Path does not exist: {path}")]
    #[diagnostic(code(tfingest::load::path_not_found))]
    PathNotFound { path: String },

    #[error("Path is not a directory: {path}")]
    #[diagnostic(code(tfingest::load::not_a_directory))]
    NotADirectory { path: String },

    #[error("directory '{path}' has no terraform config files")]
    #[diagnostic(
        code(tfingest::load::no_config_files),
        help("A configuration directory must contain at least one *.tf file")
    )]
    NoConfigFiles { path: String },

    #[error("failed to parse '{path}': {reason}")]
    #[diagnostic(code(tfingest::parser::parse_failed))]
    ParseFailed { path: String, reason: String },

    #[error("invalid module source '{source_addr}': {reason}")]
    #[diagnostic(code(tfingest::load::invalid_module_source))]
    InvalidModuleSource { source_addr: String, reason: String },

    #[error("module call cycle detected at '{path}'")]
    #[diagnostic(code(tfingest::load::module_cycle))]
    ModuleCycle { path: String },

    #[error("scan cancelled")]
    #[diagnostic(code(tfingest::load::cancelled))]
    Cancelled,

    // Address errors
    #[error("invalid module address '{address}': {reason}")]
    #[diagnostic(
        code(tfingest::source::invalid_address),
        help("Valid formats: ./path, github.com/org/repo, git::https://host/repo.git?ref=v1, namespace/name/provider")
    )]
    InvalidAddress { address: String, reason: String },

    #[error("invalid source string: {address}")]
    #[diagnostic(code(tfingest::getter::detection_failed))]
    DetectionFailed { address: String },

    #[error("download not supported for scheme '{getter}'")]
    #[diagnostic(code(tfingest::getter::unsupported))]
    UnsupportedGetter { getter: String },

    #[error("failed to download '{address}': {reason}")]
    #[diagnostic(code(tfingest::getter::transfer_failed))]
    TransferFailed { address: String, reason: String },

    #[error("subdir '{subdir}' not found")]
    #[diagnostic(code(tfingest::getter::subdir_not_found))]
    SubdirNotFound { subdir: String },

    #[error("subdir '{subdir}' matches multiple paths")]
    #[diagnostic(code(tfingest::getter::subdir_ambiguous))]
    SubdirAmbiguous { subdir: String },

    // Git errors
    #[error("Failed to clone repository: {url}: {reason}")]
    #[diagnostic(
        code(tfingest::git::clone_failed),
        help("Check that URL is correct and you have access to repository")
    )]
    GitCloneFailed { url: String, reason: String },

    #[error("Failed to resolve git ref '{git_ref}': {reason}")]
    #[diagnostic(code(tfingest::git::ref_resolve_failed))]
    GitRefResolveFailed { git_ref: String, reason: String },

    #[error("Failed to checkout commit '{sha}': {reason}")]
    #[diagnostic(code(tfingest::git::checkout_failed))]
    GitCheckoutFailed { sha: String, reason: String },

    #[error("Git operation failed: {message}")]
    #[diagnostic(code(tfingest::git::operation_failed))]
    GitOperationFailed { message: String },

    // Archive errors
    #[error("failed to decompress '{path}': {reason}")]
    #[diagnostic(code(tfingest::archive::decompress_failed))]
    Archive { path: String, reason: String },

    #[error("archive entry '{entry}' escapes the destination directory")]
    #[diagnostic(code(tfingest::archive::unsafe_entry))]
    UnsafeArchiveEntry { entry: String },

    // HTTP errors
    #[error("request to '{url}' failed: {reason}")]
    #[diagnostic(code(tfingest::http::request_failed))]
    Http { url: String, reason: String },

    #[error("request to '{url}' returned status {status}")]
    #[diagnostic(code(tfingest::http::bad_status))]
    HttpStatus { url: String, status: u16 },

    // Registry errors
    #[error("'{host}' is not a valid module registry")]
    #[diagnostic(
        code(tfingest::registry::not_a_registry),
        help("The host must serve /.well-known/terraform.json with a modules.v1 entry")
    )]
    NotARegistry { host: String },

    #[error("module '{module}' not found at registry: {host}")]
    #[diagnostic(code(tfingest::registry::module_not_found))]
    ModuleNotFound { module: String, host: String },

    #[error("no versions for module: {module}, found at registry: {host}")]
    #[diagnostic(code(tfingest::registry::no_versions))]
    NoVersions { module: String, host: String },

    #[error(
        "no versions matching: {constraint}, for module: {module}, found at registry: {host}, latest version found: {latest}"
    )]
    #[diagnostic(code(tfingest::registry::no_matching_version))]
    NoMatchingVersion {
        constraint: String,
        module: String,
        host: String,
        latest: String,
    },

    #[error("invalid version '{version}'")]
    #[diagnostic(code(tfingest::registry::invalid_version))]
    InvalidVersion { version: String },

    #[error("invalid version constraint '{constraint}': {reason}")]
    #[diagnostic(code(tfingest::registry::invalid_constraint))]
    InvalidConstraint { constraint: String, reason: String },

    #[error("failed to fetch latest version for provider '{provider}': {reason}")]
    #[diagnostic(code(tfingest::registry::provider_version))]
    ProviderVersion { provider: String, reason: String },

    // Manifest errors
    #[error("failed to read module manifest '{path}': {reason}")]
    #[diagnostic(code(tfingest::manifest::read_failed))]
    Manifest { path: String, reason: String },

    // Generic errors
    #[error("IO error: {message}")]
    #[diagnostic(code(tfingest::io::error))]
    Io { message: String },

    #[error("JSON error: {message}")]
    #[diagnostic(code(tfingest::json::error))]
    Json { message: String },

    #[error("{0}")]
    #[diagnostic(code(tfingest::load::aggregate))]
    Aggregate(AggregateError),
}

/// Result type alias using `IngestError`
pub type Result<T> = miette::Result<T, IngestError>;

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Json {
            message: err.to_string(),
        }
    }
}

impl From<git2::Error> for IngestError {
    fn from(err: git2::Error) -> Self {
        IngestError::GitOperationFailed {
            message: err.message().to_string(),
        }
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        IngestError::Http {
            url: err
                .url()
                .map(ToString::to_string)
                .unwrap_or_default(),
            reason: err.to_string(),
        }
    }
}

impl From<hcl_edit::parser::Error> for IngestError {
    fn from(err: hcl_edit::parser::Error) -> Self {
        IngestError::ParseFailed {
            path: String::new(),
            reason: err.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for IngestError {
    fn from(err: zip::result::ZipError) -> Self {
        IngestError::Archive {
            path: String::new(),
            reason: err.to_string(),
        }
    }
}

impl From<walkdir::Error> for IngestError {
    fn from(err: walkdir::Error) -> Self {
        IngestError::Io {
            message: err.to_string(),
        }
    }
}

impl From<AggregateError> for IngestError {
    fn from(err: AggregateError) -> Self {
        IngestError::Aggregate(err)
    }
}

/// Create a transfer failure for `address`
pub fn transfer_failed(address: impl Into<String>, reason: impl ToString) -> IngestError {
    IngestError::TransferFailed {
        address: address.into(),
        reason: reason.to_string(),
    }
}

/// Create an invalid-address error
pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> IngestError {
    IngestError::InvalidAddress {
        address: address.into(),
        reason: reason.into(),
    }
}

/// Create an IO error carrying the path that caused it
pub fn io_error(path: &std::path::Path, err: &std::io::Error) -> IngestError {
    IngestError::Io {
        message: format!("{}: {err}", path.display()),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    /// Assert that an error's display contains each of the given substrings
    macro_rules! test_error_contains {
        ($err:expr, $($needle:expr),+ $(,)?) => {{
            let msg = $err.to_string();
            $(
                assert!(msg.contains($needle), "expected '{}' in '{}'", $needle, msg);
            )+
        }};
    }

    #[test]
    fn test_no_matching_version_message() {
        let err = IngestError::NoMatchingVersion {
            constraint: "3.17.0".to_string(),
            module: "hashicorp/consul/aws".to_string(),
            host: "registry.terraform.io".to_string(),
            latest: "1.2.0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no versions matching: 3.17.0, for module: hashicorp/consul/aws, found at registry: registry.terraform.io, latest version found: 1.2.0"
        );
    }

    #[test]
    fn test_no_versions_message() {
        let err = IngestError::NoVersions {
            module: "a/b/c".to_string(),
            host: "example.com".to_string(),
        };
        test_error_contains!(err, "no versions for module: a/b/c", "example.com");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: IngestError = io.into();
        assert!(matches!(err, IngestError::Io { .. }));
        test_error_contains!(err, "gone");
    }

    #[test]
    fn test_transfer_failed_constructor() {
        let err = transfer_failed("git::https://example.com/repo.git", "boom");
        test_error_contains!(err, "git::https://example.com/repo.git", "boom");
    }

    #[test]
    fn test_diagnostic_codes() {
        let err = IngestError::SubdirAmbiguous {
            subdir: "mod*".to_string(),
        };
        let code = err.code().expect("code").to_string();
        assert_eq!(code, "tfingest::getter::subdir_ambiguous");
    }
}
