//! Error types for backlog
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, not a backlog project, store not initialized)
//! - 4: Operation failed (I/O, serialization)
//!
//! The store reports a missing task or milestone as `None`/`false`; the
//! not-found variants are raised by the CLI when a named entity is absent.

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the backlog CLI
pub mod exit_codes {
    pub const USER_ERROR: i32 = 2;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for backlog operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Not a backlog project: no config file at {0}")]
    NotAProject(PathBuf),

    #[error("Store is not initialized; call initialize() or initialize_lazy() first")]
    NotInitialized,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Milestone not found: {0}")]
    MilestoneNotFound(String),

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotAProject(_)
            | Error::NotInitialized
            | Error::InvalidArgument(_)
            | Error::TaskNotFound(_)
            | Error::MilestoneNotFound(_) => exit_codes::USER_ERROR,

            Error::Io(_) | Error::Json(_) | Error::OperationFailed(_) => {
                exit_codes::OPERATION_FAILED
            }
        }
    }

    /// Structured details for JSON error output
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::NotAProject(path) => Some(serde_json::json!({
                "config_path": path.to_string_lossy(),
            })),
            Error::InvalidArgument(message) => Some(serde_json::json!({ "message": message })),
            Error::TaskNotFound(id) => Some(serde_json::json!({ "task_id": id })),
            Error::MilestoneNotFound(id) => Some(serde_json::json!({ "milestone_id": id })),
            _ => None,
        }
    }

    /// True when the underlying I/O error is "file not found"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Result type alias for backlog operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_detected_through_io_variant() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(err.is_not_found());
        assert!(!Error::NotInitialized.is_not_found());
    }

    #[test]
    fn exit_codes_split_user_and_operation_errors() {
        assert_eq!(Error::TaskNotFound("7".into()).exit_code(), exit_codes::USER_ERROR);
        assert_eq!(Error::NotInitialized.exit_code(), exit_codes::USER_ERROR);
        let io = Error::from(std::io::Error::other("disk"));
        assert_eq!(io.exit_code(), exit_codes::OPERATION_FAILED);
        assert_eq!(
            Error::MilestoneNotFound("m-3".into()).details(),
            Some(serde_json::json!({ "milestone_id": "m-3" }))
        );
    }
}
