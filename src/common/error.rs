//! Error model for sheetlens operations.
//!
//! Failures live on two planes. Content-level problems -- a corrupt sheet,
//! an unreadable part, a missing header row -- are captured as [`LoadError`]
//! entries inside the returned [`FileDocument`] and never thrown. Only
//! cancellation and programmer errors abort a read, as [`ReadFault`].
//! Comparison preconditions get their own [`CompareError`] so callers can
//! offer retry or removal.
//!
//! [`FileDocument`]: crate::sheet::FileDocument

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Faults that abort a read outright.
///
/// Everything else -- bad format, corruption, empty sheets -- degrades the
/// returned document instead of failing the call.
#[derive(Debug, Error)]
pub enum ReadFault {
    /// The caller's [`CancelToken`](crate::common::CancelToken) was tripped.
    #[error("operation cancelled")]
    Cancelled,

    /// A required argument was missing or malformed. Always a caller bug.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// How serious a load error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// The file remains usable; something was skipped or degraded.
    Warning,
    /// Content could not be read.
    Error,
}

/// Classification of a content-level load failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadErrorKind {
    /// No reader owns the file's extension.
    UnsupportedFormat,
    /// The file or a part of it is corrupt or structurally invalid.
    InvalidStructure,
    /// The file could not be opened or read from disk.
    Io,
    /// A sheet's header row is absent or entirely blank.
    EmptyHeader,
    /// Headers or layout differ in a tolerated but noteworthy way.
    StructuralInconsistency,
}

/// One structured error captured during a load attempt.
///
/// Serializable so the caller's append-only JSON load log can persist it
/// verbatim; the message is presentation-ready but unlocalized.
#[derive(Debug, Clone, Serialize)]
pub struct LoadError {
    pub kind: LoadErrorKind,
    pub severity: Severity,
    pub message: String,
    /// Usually the sheet name.
    pub context: Option<String>,
    /// "A1"-style location when the failure is cell-scoped.
    pub cell: Option<String>,
    /// Rendered message of the wrapped cause, if any.
    pub source_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LoadError {
    pub fn new(kind: LoadErrorKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            context: None,
            cell: None,
            source_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(kind: LoadErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, message)
    }

    pub fn warning(kind: LoadErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, message)
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_cell(mut self, cell: impl Into<String>) -> Self {
        self.cell = Some(cell.into());
        self
    }

    pub fn with_source(mut self, source: &dyn std::error::Error) -> Self {
        self.source_message = Some(source.to_string());
        self
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, " (in {})", context)?;
        }
        if let Some(cell) = &self.cell {
            write!(f, " at {}", cell)?;
        }
        if let Some(source) = &self.source_message {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

/// Precondition faults raised by the row-comparison engine.
#[derive(Debug, Error)]
pub enum CompareError {
    /// A comparison needs at least two rows.
    #[error("row comparison requires at least 2 rows, got {0}")]
    InsufficientRows(usize),

    /// The row's source document has been removed from the active set.
    #[error("document '{path}' is no longer loaded")]
    MissingDocument { path: String },

    /// The row's sheet vanished from its source, e.g. after a reload with a
    /// changed structure.
    #[error("sheet '{sheet}' no longer exists in '{path}'")]
    MissingSheet { path: String, sheet: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_and_cell() {
        let err = LoadError::error(LoadErrorKind::InvalidStructure, "bad cell value")
            .with_context("Sheet1")
            .with_cell("B7");
        assert_eq!(err.to_string(), "bad cell value (in Sheet1) at B7");
    }

    #[test]
    fn serializes_for_the_load_log() {
        let err = LoadError::warning(LoadErrorKind::EmptyHeader, "header row is empty")
            .with_context("Data");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "EmptyHeader");
        assert_eq!(json["severity"], "Warning");
        assert_eq!(json["context"], "Data");
        assert!(json["timestamp"].is_string());
    }
}
