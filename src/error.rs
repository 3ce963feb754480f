//! Error types for snapsend.
//!
//! This module defines all error types used throughout the crate. Uses
//! `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use thiserror::Error;

/// The primary error type for snapsend operations.
#[derive(Error, Debug)]
pub enum SnapError {
    /// Configuration-related errors (invalid config, bad pattern, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Recognition backend errors (request failures, bad payloads, etc.)
    #[error("Recognition error: {0}")]
    Recognition(String),

    /// Directory errors (friend/group listing failures)
    #[error("Directory error: {0}")]
    Directory(String),

    /// Transport errors (send failures, OneBot API errors)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Inline-markup errors (malformed token kinds or attribute keys)
    #[error("Markup error: {0}")]
    Markup(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for snapsend operations.
pub type Result<T> = std::result::Result<T, SnapError>;
