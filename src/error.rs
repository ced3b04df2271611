//! Structured error handling and exit codes.

use serde::Serialize;
use thiserror::Error;

/// Exit codes for the devscan application.
///
/// - 0: Success (devices found, every transport worked)
/// - 1: General error (unexpected failure)
/// - 2: No devices found
/// - 3: Partial success (devices found, but some transport failed)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: devices were found and no transport failed.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// No devices: the scan completed without finding anything.
    NoDevices = 2,
    /// Partial success: devices were found but some transport failed.
    PartialSuccess = 3,
    /// Interrupted: the scan was interrupted by the user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DS000",
            Self::GeneralError => "DS001",
            Self::NoDevices => "DS002",
            Self::PartialSuccess => "DS003",
            Self::Interrupted => "DS130",
        }
    }

    /// Exit code for a completed scan.
    #[must_use]
    pub fn for_scan(devices: usize, failures: usize) -> Self {
        match (devices, failures) {
            (0, _) => Self::NoDevices,
            (_, 0) => Self::Success,
            _ => Self::PartialSuccess,
        }
    }
}

/// Application-level errors that pick a specific exit code.
#[derive(Error, Debug)]
pub enum AppError {
    /// The user interrupted the scan.
    #[error("Scan interrupted by user")]
    Interrupted,
}

impl AppError {
    /// Exit code this error maps to.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Interrupted => ExitCode::Interrupted,
        }
    }
}

/// Pick the exit code for an error returned by [`crate::run_app`].
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    err.downcast_ref::<AppError>()
        .map_or(ExitCode::GeneralError, AppError::exit_code)
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DS001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
