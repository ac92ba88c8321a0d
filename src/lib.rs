//! Lead Feed - Contact Form Submissions to a Leads API
//!
//! A Rust library that turns contact-form submissions into normalized lead
//! records and forwards them to a third-party leads API.
//!
//! # Features
//!
//! - Per-form field mapping onto a fixed lead model
//! - Overflow collection of unmapped fields
//! - UTM attribution captured from cookies
//! - Single-attempt delivery with an append-only request/response log
//! - Credential tests against the verification endpoint
//! - Maintainer notification on transport failures

/// Outbound HTTP to the leads API
pub mod client;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Error types
pub mod error;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Maintainer notifications
pub mod notify;
/// Lead payload assembly
pub mod payload;
/// Database schema definitions
pub mod schema;
/// The submission-to-log pipeline
pub mod service;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use client::{HttpLeadsApi, LeadsApi};
pub use db::Database;
pub use error::{LeadFeedError, Result};
pub use models::{FieldMapping, FieldSource, LeadPayload, LogicalField, Submission, UtmContext};
pub use payload::PayloadBuilder;
pub use service::{FeedOutcome, LeadFeed, SkipReason};
