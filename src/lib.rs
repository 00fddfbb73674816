//! tfingest - Terraform module tree ingestion
//!
//! Loads a directory of Terraform configuration, fetches every module it calls
//! (local paths, registry modules, git/http/s3/gcs/file sources), resolves
//! variable, local, module and lookup references across the module tree, and
//! emits one normalized [`ResourceRecord`] per resource grouped by type.
//!
//! ```no_run
//! use std::path::Path;
//! use tfingest::{LoadOptions, load_iac_dir};
//!
//! let output = load_iac_dir(Path::new("./infra"), &LoadOptions::new())?;
//! for (kind, records) in &output.resources {
//!     println!("{kind}: {}", records.len());
//! }
//! if let Some(errors) = &output.errors {
//!     eprintln!("{errors}");
//! }
//! # Ok::<(), tfingest::IngestError>(())
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod getter;
pub mod installer;
pub mod loader;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod source;

pub use config::{LoadOptions, Settings};
pub use domain::{ResourceRecord, ResourcesByType};
pub use error::{AggregateError, DirError, IngestError, Result};
pub use loader::{DirectoryLoader, LoadOutput, load_iac_dir};
