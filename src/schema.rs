//! Database schema definitions
//!
//! This module provides constants for table and column names used with rusqlite.

/// Schema version written by the migrations
pub const SCHEMA_VERSION: i32 = 1;

/// API request/response log table schema
pub mod api_log {
    /// Table name
    pub const TABLE: &str = "api_log";
    /// Primary key column
    pub const ID: &str = "id";
    /// Local time the attempt was logged
    pub const TIME: &str = "time";
    /// Submitting form id column
    pub const FORM_ID: &str = "form_id";
    /// Raw request body column
    pub const REQUEST: &str = "request";
    /// Raw response column
    pub const RESPONSE: &str = "response";
}

/// Per-form feed settings table schema
pub mod form_settings {
    /// Table name
    pub const TABLE: &str = "form_settings";
    /// Form identifier, primary key
    pub const FORM_ID: &str = "form_id";
    /// Flag indicating if the form is fed to the API
    pub const ENABLED: &str = "enabled";
    /// Field mapping JSON column
    pub const MAPPING: &str = "mapping";
    /// Last save timestamp column
    pub const UPDATED_AT: &str = "updated_at";
}

/// Maintainer mail outbox table schema
pub mod mail_outbox {
    /// Table name
    pub const TABLE: &str = "mail_outbox";
    /// Primary key column
    pub const ID: &str = "id";
    /// Queue timestamp column
    pub const QUEUED_AT: &str = "queued_at";
    /// Recipient address column
    pub const RECIPIENT: &str = "recipient";
    /// Subject line column
    pub const SUBJECT: &str = "subject";
    /// Body column
    pub const BODY: &str = "body";
    /// Body content type column
    pub const CONTENT_TYPE: &str = "content_type";
    /// Sent timestamp column, null while pending
    pub const SENT_AT: &str = "sent_at";
}
