//! Non-fatal problems found while loading or mutating a backlog.
//!
//! The store never aborts a bulk operation because one file is bad. It reports
//! the problem here and carries on. By default diagnostics go to `tracing`;
//! callers can collect them in memory or stream them as JSON lines.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

pub const DIAGNOSTIC_SCHEMA_VERSION: &str = "backlog.diagnostic.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A task or milestone file could not be parsed and was skipped.
    ParseFailure,
    /// A file could not be read.
    ReadFailure,
    /// A task status was not in the configured list and was replaced.
    InvalidStatus,
    /// Two task files claim the same id.
    DuplicateId,
    /// A task referenced a milestone that does not exist.
    MilestoneNotFound,
    /// Removing a superseded file failed.
    CleanupFailed,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::ParseFailure => "parse_failure",
            DiagnosticKind::ReadFailure => "read_failure",
            DiagnosticKind::InvalidStatus => "invalid_status",
            DiagnosticKind::DuplicateId => "duplicate_id",
            DiagnosticKind::MilestoneNotFound => "milestone_not_found",
            DiagnosticKind::CleanupFailed => "cleanup_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub schema_version: &'static str,
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            schema_version: DIAGNOSTIC_SCHEMA_VERSION,
            kind,
            message: message.into(),
            path: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Receiver for diagnostics. Implementations must not fail.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Logs each diagnostic as a `tracing` warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        tracing::warn!(
            kind = diagnostic.kind.as_str(),
            path = diagnostic.path.as_deref().unwrap_or(""),
            "{}",
            diagnostic.message
        );
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<DiagnosticKind> {
        self.entries().iter().map(|d| d.kind).collect()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(diagnostic);
        }
    }
}

/// Where `--diagnostics` output goes.
#[derive(Debug, Clone)]
pub enum DiagnosticDestination {
    Stderr,
    File(PathBuf),
}

impl DiagnosticDestination {
    /// `-` means stderr; blank means none.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(DiagnosticDestination::Stderr);
            }
            Some(DiagnosticDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<JsonlSink> {
        match self {
            DiagnosticDestination::Stderr => Ok(JsonlSink::stderr()),
            DiagnosticDestination::File(path) => JsonlSink::file(path),
        }
    }
}

/// Writes diagnostics as JSON lines.
pub struct JsonlSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonlSink {
    pub fn stderr() -> Self {
        Self {
            writer: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Append to a file, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Mutex::new(Box::new(file)),
        })
    }

    fn write(&self, diagnostic: &Diagnostic) -> Result<()> {
        let serialized = serde_json::to_vec(diagnostic)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::OperationFailed("diagnostic writer poisoned".to_string()))?;
        writer.write_all(&serialized)?;
        writer.write_all(b"\n")?;
        writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}

impl DiagnosticSink for JsonlSink {
    fn report(&self, diagnostic: Diagnostic) {
        if let Err(err) = self.write(&diagnostic) {
            tracing::warn!(error = %err, "failed to write diagnostic");
        }
    }
}
