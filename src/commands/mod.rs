//! Command implementations for the tfingest CLI

pub mod scan;
