//! Error types for the lead-feed library.
//!
//! This module provides custom error types using `thiserror` for better error handling
//! and more specific error messages throughout the application.

use thiserror::Error;

/// Errors that can occur in the lead-feed library.
#[derive(Error, Debug)]
pub enum LeadFeedError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A field mapping blob that cannot be turned into a typed mapping
    #[error("Invalid field mapping: {0}")]
    InvalidMapping(String),

    /// An ignored-field pattern failed to compile
    #[error("Invalid field pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The maintainer notification could not be queued
    #[error("Notification error: {0}")]
    Notification(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with `LeadFeedError`
pub type Result<T> = std::result::Result<T, LeadFeedError>;

impl From<anyhow::Error> for LeadFeedError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
