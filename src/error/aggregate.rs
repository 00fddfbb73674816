//! Thread-safe collection of per-directory diagnostics
//!
//! Every partial failure of a scan is recorded as a `{directory, message}` pair.
//! The sink is shared by reference between the loader, the installer and the
//! walker; appends from several threads never lose records.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// One diagnostic tied to the directory it was raised for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirError {
    pub directory: String,
    pub message: String,
}

impl DirError {
    pub fn new(directory: &Path, message: impl Into<String>) -> Self {
        Self {
            directory: directory.display().to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DirError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.directory, self.message)
    }
}

/// Composite error returned next to the resources of a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateError {
    records: Vec<DirError>,
}

impl AggregateError {
    pub fn new(records: Vec<DirError>) -> Self {
        Self { records }
    }

    /// Structured view of every recorded diagnostic, in append order
    pub fn records(&self) -> &[DirError] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether any record was raised for `dir`
    pub fn mentions(&self, dir: &Path) -> bool {
        let dir = dir.display().to_string();
        self.records.iter().any(|r| r.directory == dir)
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{record}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// The error aggregator of a scan
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    errors: Mutex<Vec<DirError>>,
    warnings: Mutex<Vec<DirError>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a per-directory error
    pub fn push(&self, directory: &Path, message: impl Into<String>) {
        let record = DirError::new(directory, message);
        tracing::warn!(dir = %record.directory, "{}", record.message);
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Record a non-fatal diagnostic that is not part of the composite error
    pub fn warn(&self, directory: &Path, message: impl Into<String>) {
        let record = DirError::new(directory, message);
        tracing::warn!(dir = %record.directory, "{}", record.message);
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn has_errors(&self) -> bool {
        !self
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub fn errors(&self) -> Vec<DirError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn warnings(&self) -> Vec<DirError> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain the sink into a composite error, `None` when nothing failed
    pub fn take_error(&self) -> Option<AggregateError> {
        let records = std::mem::take(
            &mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if records.is_empty() {
            None
        } else {
            Some(AggregateError::new(records))
        }
    }

    pub fn take_warnings(&self) -> Vec<DirError> {
        std::mem::take(&mut *self.warnings.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_display_joins_records_with_newlines() {
        let sink = DiagnosticSink::new();
        sink.push(Path::new("/a"), "first");
        sink.push(Path::new("/b"), "second");
        let err = sink.take_error().expect("errors recorded");
        assert_eq!(err.to_string(), "/a: first\n/b: second");
        assert_eq!(err.records().len(), 2);
        assert!(err.mentions(Path::new("/b")));
        assert!(!err.mentions(Path::new("/c")));
    }

    #[test]
    fn test_empty_sink_has_no_error() {
        let sink = DiagnosticSink::new();
        sink.warn(Path::new("/a"), "duplicate variable");
        assert!(sink.take_error().is_none());
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let sink = Arc::new(DiagnosticSink::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        sink.push(Path::new("/dir"), format!("{t}-{i}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread");
        }
        assert_eq!(sink.errors().len(), 400);
    }
}
