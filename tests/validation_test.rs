//! Unit tests for validation.rs module

use lead_feed::models::{FieldMapping, FieldSource, LogicalField, CREDENTIAL_TEST_FORM_ID};
use lead_feed::validation::InputValidator;

#[test]
fn test_validate_username_valid() {
    assert!(InputValidator::validate_username("acme-leads").is_ok());
}

#[test]
fn test_validate_username_blank() {
    assert!(InputValidator::validate_username("").is_err());
    assert!(InputValidator::validate_username("   ").is_err());
}

#[test]
fn test_validate_username_too_long() {
    assert!(InputValidator::validate_username(&"a".repeat(101)).is_err());
    assert!(InputValidator::validate_username(&"a".repeat(100)).is_ok());
}

#[test]
fn test_validate_api_key() {
    assert!(InputValidator::validate_api_key("k3y-ABC_123").is_ok());
    assert!(InputValidator::validate_api_key("").is_err());
    assert!(InputValidator::validate_api_key("two words").is_err());
    assert!(InputValidator::validate_api_key("line\nbreak").is_err());
    assert!(InputValidator::validate_api_key(&"k".repeat(257)).is_err());
}

#[test]
fn test_validate_email() {
    assert!(InputValidator::validate_email("dev@example.com").is_ok());
    assert!(InputValidator::validate_email("").is_err());
    assert!(InputValidator::validate_email("dev.example.com").is_err());
    assert!(InputValidator::validate_email("a@b@example.com").is_err());
    assert!(InputValidator::validate_email("@example.com").is_err());
    assert!(InputValidator::validate_email("dev@localhost").is_err());
}

#[test]
fn test_validate_endpoint_url() {
    assert!(InputValidator::validate_endpoint_url("https://api.example.com/leads/new").is_ok());
    assert!(InputValidator::validate_endpoint_url("http://127.0.0.1:8080/new").is_ok());
    assert!(InputValidator::validate_endpoint_url("ftp://api.example.com").is_err());
    assert!(InputValidator::validate_endpoint_url("/relative/path").is_err());
}

#[test]
fn test_validate_database_url() {
    assert!(InputValidator::validate_database_url("sqlite::memory:").is_ok());
    assert!(InputValidator::validate_database_url("sqlite:data/lead_feed.db").is_ok());
    assert!(InputValidator::validate_database_url("").is_err());
    assert!(InputValidator::validate_database_url("mysql://localhost/wp").is_err());
}

#[test]
fn test_validate_form_id() {
    assert!(InputValidator::validate_form_id(42).is_ok());
    assert!(InputValidator::validate_form_id(0).is_err());
    assert!(InputValidator::validate_form_id(-3).is_err());
}

#[test]
fn test_validate_form_id_rejects_credential_test_id() {
    let err = InputValidator::validate_form_id(CREDENTIAL_TEST_FORM_ID).unwrap_err();
    assert!(err.to_string().contains("reserved"));
}

#[test]
fn test_validate_field_key() {
    assert!(InputValidator::validate_field_key("your-name").is_ok());
    assert!(InputValidator::validate_field_key("").is_err());
    assert!(InputValidator::validate_field_key("your name").is_err());
    assert!(InputValidator::validate_field_key(&"k".repeat(256)).is_err());
}

#[test]
fn test_validate_mapping() {
    let mapping = FieldMapping::new()
        .map(LogicalField::Name, "your-name")
        .assign(LogicalField::Message, FieldSource::MultipleFields);
    assert!(InputValidator::validate_mapping(&mapping).is_ok());

    assert!(InputValidator::validate_mapping(&FieldMapping::new()).is_err());
    assert!(InputValidator::validate_mapping(&FieldMapping::new().with_overflow()).is_ok());

    let bad = FieldMapping::new().map(LogicalField::Email, "your email");
    assert!(InputValidator::validate_mapping(&bad).is_err());
}
