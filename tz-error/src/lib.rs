//! Unified error handling for Thermzone
//!
//! This crate provides a single error type used across all Thermzone components,
//! plus the small [`ErrorKind`] vocabulary that is handed back to waiting
//! clients as a request's terminal outcome.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Result type alias using ThermalError
pub type Result<T> = std::result::Result<T, ThermalError>;

/// Outcome classes a single watch request can fail with.
///
/// Only `InvalidRequest` and `ResourceExhausted` are ever delivered to a
/// caller. `NotFound` marks a request that was already retired by a
/// concurrent path and is swallowed by the zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    ResourceExhausted,
    NotFound,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidRequest => "invalid request",
            ErrorKind::ResourceExhausted => "resource exhausted",
            ErrorKind::NotFound => "not found",
        };
        f.write_str(s)
    }
}

/// Unified error type for all Thermzone operations
#[derive(thiserror::Error, Debug)]
pub enum ThermalError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // Zone Errors
    // ============================================================================
    #[error("Invalid watch band: low {low} is above high {high}")]
    InvalidBand {
        low: u32,
        high: u32,
    },

    #[error("Output buffer cannot hold a reading ({len} bytes, need {expected})")]
    OutputShape {
        len: usize,
        expected: usize,
    },

    #[error("Pending request limit reached ({limit})")]
    QueueFull {
        limit: usize,
    },

    #[error("Failed to arm expiry timer: {0}")]
    TimerUnavailable(String),

    #[error("Watch request {0} not found")]
    RequestNotFound(u64),

    // ============================================================================
    // Daemon and IPC Errors
    // ============================================================================
    #[error("Daemon not available")]
    DaemonNotAvailable,

    #[error("Daemon connection failed: {0}")]
    DaemonConnection(String),

    #[error("Daemon request failed: {0}")]
    DaemonRequest(String),

    #[error("IPC protocol error: {0}")]
    IpcProtocol(String),

    #[error("Message too large: {size} bytes (max {max_size} bytes)")]
    MessageTooLarge {
        size: usize,
        max_size: usize,
    },

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl ThermalError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Map onto the per-request outcome vocabulary.
    ///
    /// Anything that is not a band/shape problem or a missing request is
    /// treated as a resource failure scoped to the one request.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBand { .. } | Self::OutputShape { .. } => ErrorKind::InvalidRequest,
            Self::RequestNotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::ResourceExhausted,
        }
    }
}
