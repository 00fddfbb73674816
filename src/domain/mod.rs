//! Domain models for tfingest
//!
//! The normalized resource record handed to downstream policy evaluation,
//! plus the helpers that read annotations and container images out of a
//! resource block.

pub mod annotations;
pub mod containers;
pub mod resource;

pub use resource::{ContainerImage, ResourceRecord, ResourcesByType, SkipRule};
