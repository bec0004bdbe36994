//! Error types for ferrolink
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using FerroError
pub type Result<T> = std::result::Result<T, FerroError>;

/// Unified error type for ferrolink operations
#[derive(Debug, Error)]
pub enum FerroError {
    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Request Validation Errors
    // -------------------------------------------------------------------------
    #[error("Invalid parameter: {0}")]
    ParamInvalid(String),

    #[error("Parameter out of range: {0}")]
    ParamOutOfRange(String),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Communication error: {0}")]
    Comm(String),
}
