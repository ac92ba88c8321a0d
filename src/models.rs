//! Data models for lead handling and storage
//!
//! This module contains all data structures used throughout the application,
//! including submissions, field mappings, lead payloads, and database models.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDateTime, SubsecRound, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::LeadFeedError;

/// Form id recorded on log entries written by a credential test
pub const CREDENTIAL_TEST_FORM_ID: i64 = 999_999;

/// Mapping value (or key) that turns on overflow collection
pub const MULTIPLE_FIELDS: &str = "multiple_fields";

/// Mapping value (or key) that leaves a logical field unassigned
pub const NO_ASSIGNMENT: &str = "no_assignment";

/// Prefix namespacing the attribution cookies set by the front-end script
pub const DEFAULT_COOKIE_PREFIX: &str = "_sherloq_";

/// Attribution keys captured from cookies, in payload order
pub const UTM_KEYS: [&str; 8] = [
    "hostname",
    "referrer",
    "gclid",
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
];

/// A lead attribute that a form field can be assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogicalField {
    /// First name, or the full name when no last name is mapped
    Name,
    /// Appended to `name`; never sent as its own field
    LastName,
    /// Email address
    Email,
    /// Phone number
    Phone,
    /// Free-form message
    Message,
}

impl LogicalField {
    /// Every logical field in model order
    pub const ALL: [Self; 5] = [
        Self::Name,
        Self::LastName,
        Self::Email,
        Self::Phone,
        Self::Message,
    ];

    /// Wire name used in mapping blobs and payloads
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::LastName => "last-name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Message => "message",
        }
    }

    /// Display title for settings screens
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::LastName => "Last-name",
            Self::Email => "Email",
            Self::Phone => "Phone",
            Self::Message => "Message",
        }
    }
}

impl fmt::Display for LogicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalField {
    type Err = LeadFeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| LeadFeedError::InvalidMapping(format!("unknown logical field: {s}")))
    }
}

/// Where a logical field takes its value from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldSource {
    /// A concrete submitted form-field key
    Field(String),
    /// Collect every unmapped field into the overflow message
    MultipleFields,
    /// Explicitly left unassigned
    NoAssignment,
}

impl FieldSource {
    /// Parse a raw mapping value; the empty string counts as unassigned
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "" | NO_ASSIGNMENT => Self::NoAssignment,
            MULTIPLE_FIELDS => Self::MultipleFields,
            key => Self::Field(key.to_string()),
        }
    }

    /// The raw mapping value for this source
    #[must_use]
    pub fn as_wire(&self) -> &str {
        match self {
            Self::Field(key) => key,
            Self::MultipleFields => MULTIPLE_FIELDS,
            Self::NoAssignment => NO_ASSIGNMENT,
        }
    }

    /// The form-field key, if this source names one
    #[must_use]
    pub fn field_key(&self) -> Option<&str> {
        match self {
            Self::Field(key) => Some(key),
            _ => None,
        }
    }
}

/// Administrator-authored association of logical fields to form-field keys.
///
/// Stored as the loosely typed blob a settings screen posts
/// (`{"name": "your-name", "message": "multiple_fields"}`); the sentinel may
/// also appear as a key (`{"multiple_fields": "1"}`). Both shapes turn on
/// overflow collection. Values stored under the sentinel keys are kept and
/// count as referenced, so a submitted field with that key is not forwarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "IndexMap<String, String>",
    into = "IndexMap<String, String>"
)]
pub struct FieldMapping {
    assignments: BTreeMap<LogicalField, FieldSource>,
    /// Value stored under a `multiple_fields` key
    overflow: Option<String>,
    /// Value stored under a `no_assignment` key
    unassigned: Option<String>,
}

impl FieldMapping {
    /// An empty mapping
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a logical field, replacing any previous assignment
    #[must_use]
    pub fn assign(mut self, field: LogicalField, source: FieldSource) -> Self {
        self.assignments.insert(field, source);
        self
    }

    /// Shorthand for assigning a concrete form-field key
    #[must_use]
    pub fn map(self, field: LogicalField, key: &str) -> Self {
        self.assign(field, FieldSource::Field(key.to_string()))
    }

    /// Turn on overflow collection without tying it to a logical field
    #[must_use]
    pub fn with_overflow(mut self) -> Self {
        self.overflow = Some("1".to_string());
        self
    }

    /// Parse the raw settings blob
    pub fn from_raw(raw: &IndexMap<String, String>) -> Result<Self, LeadFeedError> {
        let mut mapping = Self::new();
        for (key, value) in raw {
            match key.as_str() {
                MULTIPLE_FIELDS => mapping.overflow = Some(value.clone()),
                NO_ASSIGNMENT => mapping.unassigned = Some(value.clone()),
                logical => {
                    let field = logical.parse::<LogicalField>()?;
                    mapping.assignments.insert(field, FieldSource::parse(value));
                }
            }
        }
        Ok(mapping)
    }

    /// Render back to the raw settings blob
    #[must_use]
    pub fn to_raw(&self) -> IndexMap<String, String> {
        let mut raw: IndexMap<String, String> = self
            .assignments
            .iter()
            .map(|(field, source)| (field.as_str().to_string(), source.as_wire().to_string()))
            .collect();
        if let Some(value) = &self.overflow {
            raw.insert(MULTIPLE_FIELDS.to_string(), value.clone());
        }
        if let Some(value) = &self.unassigned {
            raw.insert(NO_ASSIGNMENT.to_string(), value.clone());
        }
        raw
    }

    /// Assignments in model order
    pub fn assignments(&self) -> impl Iterator<Item = (LogicalField, &FieldSource)> {
        self.assignments.iter().map(|(field, source)| (*field, source))
    }

    /// The source assigned to a logical field
    #[must_use]
    pub fn source(&self, field: LogicalField) -> Option<&FieldSource> {
        self.assignments.get(&field)
    }

    /// Every form-field key this mapping consumes, sentinel-key values included
    #[must_use]
    pub fn referenced_keys(&self) -> HashSet<&str> {
        self.assignments
            .values()
            .filter_map(FieldSource::field_key)
            .chain(self.sentinel_values())
            .collect()
    }

    /// True when the key is consumed by an assignment or named under a sentinel key
    #[must_use]
    pub fn references(&self, key: &str) -> bool {
        self.assignments
            .values()
            .any(|source| source.field_key() == Some(key))
            || self.sentinel_values().any(|value| value == key)
    }

    /// True when unmapped fields are summarized into the message
    #[must_use]
    pub fn collects_overflow(&self) -> bool {
        self.overflow.is_some()
            || self
                .assignments
                .values()
                .any(|source| *source == FieldSource::MultipleFields)
    }

    /// True when nothing is assigned and overflow is off
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.overflow.is_none()
    }

    fn sentinel_values(&self) -> impl Iterator<Item = &str> {
        self.overflow
            .iter()
            .chain(&self.unassigned)
            .map(String::as_str)
    }
}

impl TryFrom<IndexMap<String, String>> for FieldMapping {
    type Error = LeadFeedError;

    fn try_from(raw: IndexMap<String, String>) -> Result<Self, Self::Error> {
        Self::from_raw(&raw)
    }
}

impl From<FieldMapping> for IndexMap<String, String> {
    fn from(mapping: FieldMapping) -> Self {
        mapping.to_raw()
    }
}

/// Request metadata captured alongside a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMeta {
    /// Address of the submitting client
    #[serde(default)]
    pub remote_ip: String,
    /// User agent of the submitting client
    #[serde(default)]
    pub user_agent: String,
    /// When the form was submitted
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
    /// Page the form was submitted from
    #[serde(default)]
    pub referer: String,
    /// Host serving the form
    #[serde(default)]
    pub host: String,
}

impl Default for SubmissionMeta {
    fn default() -> Self {
        Self {
            remote_ip: String::new(),
            user_agent: String::new(),
            submitted_at: Utc::now(),
            referer: String::new(),
            host: String::new(),
        }
    }
}

/// A submitted form: ordered field values plus request metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Submitted values keyed by form-field key, in form order
    pub fields: IndexMap<String, String>,
    /// Request metadata
    #[serde(default)]
    pub meta: SubmissionMeta,
}

impl Submission {
    /// An empty submission with the given metadata
    #[must_use]
    pub fn new(meta: SubmissionMeta) -> Self {
        Self {
            fields: IndexMap::new(),
            meta,
        }
    }

    /// Append a field value
    #[must_use]
    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    /// Value submitted for a key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Campaign attribution captured from namespaced cookies.
///
/// A key is present only when its cookie was set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct UtmContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gclid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
}

impl UtmContext {
    /// Read every `<prefix><utm key>` cookie that is set
    #[must_use]
    pub fn from_cookies(cookies: &HashMap<String, String>, prefix: &str) -> Self {
        let mut utm = Self::default();
        for key in UTM_KEYS {
            if let Some(value) = cookies.get(&format!("{prefix}{key}")) {
                utm.set(key, value.clone());
            }
        }
        utm
    }

    /// Set a key by name; unknown names are ignored
    pub fn set(&mut self, key: &str, value: String) {
        if let Some(slot) = self.slot_mut(key) {
            *slot = Some(value);
        }
    }

    /// Value captured for a key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        let slot = match key {
            "hostname" => &self.hostname,
            "referrer" => &self.referrer,
            "gclid" => &self.gclid,
            "utm_source" => &self.utm_source,
            "utm_medium" => &self.utm_medium,
            "utm_campaign" => &self.utm_campaign,
            "utm_term" => &self.utm_term,
            "utm_content" => &self.utm_content,
            _ => return None,
        };
        slot.as_deref()
    }

    /// True when no attribution cookie was set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        UTM_KEYS.iter().all(|key| self.get(key).is_none())
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            "hostname" => Some(&mut self.hostname),
            "referrer" => Some(&mut self.referrer),
            "gclid" => Some(&mut self.gclid),
            "utm_source" => Some(&mut self.utm_source),
            "utm_medium" => Some(&mut self.utm_medium),
            "utm_campaign" => Some(&mut self.utm_campaign),
            "utm_term" => Some(&mut self.utm_term),
            "utm_content" => Some(&mut self.utm_content),
            _ => None,
        }
    }
}

/// The normalized lead record sent to the leads API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadPayload {
    /// API username configured for the site
    pub username: String,
    /// Host the form was submitted on
    pub site: String,
    /// Mapped name, with the mapped last name appended
    pub name: String,
    /// Mapped email
    pub email: String,
    /// Mapped phone
    pub phone: String,
    /// Mapped message, or the overflow summary
    pub message: String,
    /// Unmapped, non-infrastructure fields in submission order
    pub additional_fields: IndexMap<String, String>,
    /// Page the form was submitted from
    pub form_page: String,
    /// Submission time as `YYYY-MM-DDTHH:MM:SS.000Z`
    pub timestamp: String,
    /// Submitting client address
    pub remote_ip: String,
    /// Submitting client user agent
    pub user_agent: String,
    /// Attribution data, flattened into the top level
    #[serde(flatten)]
    pub utm: UtmContext,
}

/// Database representation of an API log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Database primary key
    pub id: i64,
    /// Local time the attempt was logged
    pub time: NaiveDateTime,
    /// Submitting form, or `CREDENTIAL_TEST_FORM_ID`
    pub form_id: i64,
    /// Raw JSON request body
    pub request: String,
    /// Raw JSON response or error message
    pub response: String,
}

/// A log entry ready to be appended
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    /// Local time the attempt was logged
    pub time: NaiveDateTime,
    /// Submitting form, or `CREDENTIAL_TEST_FORM_ID`
    pub form_id: i64,
    /// Raw JSON request body
    pub request: String,
    /// Raw JSON response or error message
    pub response: String,
}

impl NewLogEntry {
    /// Stamp an entry with the current local time, to the second
    #[must_use]
    pub fn now(form_id: i64, request: String, response: String) -> Self {
        Self {
            time: Local::now().naive_local().trunc_subsecs(0),
            form_id,
            request,
            response,
        }
    }
}

/// Per-form feed configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSettings {
    /// Form identifier
    pub form_id: i64,
    /// Whether submissions of this form are fed to the API
    pub enabled: bool,
    /// Field mapping for this form
    pub mapping: FieldMapping,
    /// Last time the settings were saved
    pub updated_at: NaiveDateTime,
}

/// Outcome of a credential test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialTestResult {
    /// True only for an HTTP 200 answer
    pub success: bool,
    /// HTTP status, absent on transport failure
    pub status: Option<u16>,
    /// What was logged as the response
    pub response: String,
    /// Id of the log entry written for the test
    pub log_id: i64,
}

/// A maintainer email waiting in the outbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboxMail {
    /// Database primary key
    pub id: i64,
    /// When the mail was queued
    pub queued_at: NaiveDateTime,
    /// Recipient address
    pub recipient: String,
    /// Subject line
    pub subject: String,
    /// Message body
    pub body: String,
    /// MIME content type of the body
    pub content_type: String,
    /// When the host mailer reported it sent
    pub sent_at: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_logical_field_round_trips_wire_names() {
        for field in LogicalField::ALL {
            assert_eq!(field.as_str().parse::<LogicalField>().unwrap(), field);
        }
        assert!("surname".parse::<LogicalField>().is_err());
    }

    #[test]
    fn test_mapping_accepts_sentinel_as_key() {
        let mapping = FieldMapping::from_raw(&raw(&[
            ("name", "your-name"),
            ("multiple_fields", "1"),
        ]))
        .unwrap();

        assert!(mapping.collects_overflow());
        assert!(mapping.references("your-name"));
        assert!(mapping.references("1"));
        assert!(!mapping.references("your-email"));
    }

    #[test]
    fn test_sentinel_key_values_survive_round_trip() {
        let blob = raw(&[
            ("name", "your-name"),
            ("multiple_fields", "on"),
            ("no_assignment", "your-fax"),
        ]);
        let mapping = FieldMapping::from_raw(&blob).unwrap();

        assert!(mapping.references("on"));
        assert!(mapping.references("your-fax"));
        assert_eq!(
            mapping.referenced_keys(),
            HashSet::from(["your-name", "on", "your-fax"])
        );
        assert_eq!(mapping.to_raw(), blob);
    }

    #[test]
    fn test_mapping_accepts_sentinel_as_value() {
        let mapping = FieldMapping::from_raw(&raw(&[
            ("email", "your-email"),
            ("message", "multiple_fields"),
            ("phone", "no_assignment"),
        ]))
        .unwrap();

        assert!(mapping.collects_overflow());
        assert_eq!(
            mapping.source(LogicalField::Phone),
            Some(&FieldSource::NoAssignment)
        );
        assert_eq!(mapping.referenced_keys().len(), 1);
    }

    #[test]
    fn test_mapping_rejects_unknown_logical_field() {
        let result = FieldMapping::from_raw(&raw(&[("company", "your-company")]));
        assert!(matches!(result, Err(LeadFeedError::InvalidMapping(_))));
    }

    #[test]
    fn test_mapping_serializes_as_raw_blob() {
        let mapping = FieldMapping::new()
            .map(LogicalField::Name, "your-name")
            .with_overflow();

        let json = serde_json::to_string(&mapping).unwrap();
        assert_eq!(json, r#"{"name":"your-name","multiple_fields":"1"}"#);

        let back: FieldMapping = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mapping);
    }

    #[test]
    fn test_utm_context_only_reads_prefixed_cookies() {
        let cookies: HashMap<String, String> = [
            ("_sherloq_utm_source", "newsletter"),
            ("_sherloq_gclid", "abc"),
            ("utm_medium", "email"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let utm = UtmContext::from_cookies(&cookies, DEFAULT_COOKIE_PREFIX);
        assert_eq!(utm.get("utm_source"), Some("newsletter"));
        assert_eq!(utm.get("gclid"), Some("abc"));
        assert_eq!(utm.get("utm_medium"), None);

        let json = serde_json::to_value(&utm).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 2);
    }
}
