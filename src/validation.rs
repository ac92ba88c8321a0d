use anyhow::{anyhow, Result};
use reqwest::Url;

use crate::models::{FieldMapping, FieldSource, CREDENTIAL_TEST_FORM_ID};

/// Validation utilities for settings and admin input
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate API username
    pub fn validate_username(username: &str) -> Result<()> {
        if username.trim().is_empty() {
            return Err(anyhow!("API username cannot be empty"));
        }

        if username.len() > 100 {
            return Err(anyhow!("API username too long (max 100 characters)"));
        }

        if username.chars().any(char::is_control) {
            return Err(anyhow!("API username contains invalid characters"));
        }

        Ok(())
    }

    /// Validate API key
    pub fn validate_api_key(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(anyhow!("API key cannot be empty"));
        }

        if key.len() > 256 {
            return Err(anyhow!("API key too long (max 256 characters)"));
        }

        // Must be usable as a header value
        if !key.chars().all(|c| c.is_ascii_graphic()) {
            return Err(anyhow!("API key may only contain visible ASCII characters"));
        }

        Ok(())
    }

    /// Validate email format
    pub fn validate_email(email: &str) -> Result<()> {
        if email.trim().is_empty() {
            return Err(anyhow!("Email cannot be empty"));
        }

        if email.len() > 254 {
            return Err(anyhow!("Email too long (max 254 characters)"));
        }

        // Basic email validation
        if !email.contains('@') {
            return Err(anyhow!("Email must contain @ symbol"));
        }

        let parts: Vec<&str> = email.split('@').collect();
        if parts.len() != 2 {
            return Err(anyhow!("Email must have exactly one @ symbol"));
        }

        let local_part = parts[0];
        let domain_part = parts[1];

        if local_part.is_empty() || local_part.len() > 64 {
            return Err(anyhow!("Email local part invalid"));
        }

        if domain_part.is_empty() || !domain_part.contains('.') {
            return Err(anyhow!("Email domain invalid"));
        }

        Ok(())
    }

    /// Validate an API endpoint
    pub fn validate_endpoint_url(url: &str) -> Result<()> {
        let parsed = Url::parse(url).map_err(|e| anyhow!("Invalid endpoint URL {url}: {e}"))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!("Endpoint URL must use http or https: {url}"));
        }

        if parsed.host_str().is_none() {
            return Err(anyhow!("Endpoint URL has no host: {url}"));
        }

        Ok(())
    }

    /// Validate database URL
    pub fn validate_database_url(url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(anyhow!("Database URL cannot be empty"));
        }

        if !url.starts_with("sqlite:") {
            return Err(anyhow!("Only SQLite databases are supported"));
        }

        if url.len() > 1000 {
            return Err(anyhow!("Database URL too long"));
        }

        Ok(())
    }

    /// Validate a form id chosen for feed settings
    pub fn validate_form_id(form_id: i64) -> Result<()> {
        if form_id <= 0 {
            return Err(anyhow!("Form id must be positive"));
        }

        if form_id == CREDENTIAL_TEST_FORM_ID {
            return Err(anyhow!(
                "Form id {CREDENTIAL_TEST_FORM_ID} is reserved for credential tests"
            ));
        }

        Ok(())
    }

    /// Validate a form-field key named by a mapping
    pub fn validate_field_key(key: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(anyhow!("Form field key cannot be blank"));
        }

        if key.len() > 255 {
            return Err(anyhow!("Form field key too long (max 255 characters)"));
        }

        if key.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(anyhow!("Form field key contains invalid characters: {key:?}"));
        }

        Ok(())
    }

    /// Validate every concrete key of a mapping
    pub fn validate_mapping(mapping: &FieldMapping) -> Result<()> {
        if mapping.is_empty() {
            return Err(anyhow!("Field mapping assigns nothing"));
        }

        for (field, source) in mapping.assignments() {
            if let FieldSource::Field(key) = source {
                Self::validate_field_key(key)
                    .map_err(|e| anyhow!("Invalid source for {field}: {e}"))?;
            }
        }

        Ok(())
    }
}
