//! Lead payload assembly
//!
//! Turns a raw submission plus the form's field mapping into the flat record
//! the leads API expects.

use regex::RegexSet;
use tracing::debug;

use crate::error::Result;
use crate::models::{
    FieldMapping, FieldSource, LeadPayload, LogicalField, Submission, UtmContext, MULTIPLE_FIELDS,
};

/// Control fields injected by the form plugin and anti-spam add-ons
pub const DEFAULT_IGNORED_FIELD_PATTERNS: [&str; 3] = ["_wpcf7", "recaptcha", "wpzerospam"];

/// Keys containing this are never copied into `additional_fields`
const LAST_NAME_KEY: &str = "last-name";

/// Format of the `timestamp` payload field
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";

/// Builds lead payloads, skipping infrastructure fields that match any of its patterns
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    ignored: RegexSet,
}

impl PayloadBuilder {
    /// Compile the ignored-field patterns
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            ignored: RegexSet::new(patterns)?,
        })
    }

    /// A builder with [`DEFAULT_IGNORED_FIELD_PATTERNS`]
    pub fn with_default_patterns() -> Result<Self> {
        Self::new(DEFAULT_IGNORED_FIELD_PATTERNS)
    }

    /// True for hidden form-control and anti-spam fields
    #[must_use]
    pub fn is_infrastructure_field(&self, key: &str) -> bool {
        self.ignored.is_match(key)
    }

    /// Assemble the payload for one submission.
    ///
    /// A mapped key missing from the submission degrades to an empty value.
    /// When the mapping collects overflow, `message` is always replaced by
    /// the `multiple_fields:` summary, even if `message` was mapped. This
    /// holds when no field is left over too: the message becomes the bare
    /// `multiple_fields:` rather than keeping the mapped value.
    #[must_use]
    pub fn build(
        &self,
        submission: &Submission,
        mapping: &FieldMapping,
        utm: &UtmContext,
        username: &str,
    ) -> LeadPayload {
        let meta = &submission.meta;
        let mut payload = LeadPayload {
            username: username.to_string(),
            site: meta.host.clone(),
            form_page: meta.referer.clone(),
            timestamp: meta.submitted_at.format(TIMESTAMP_FORMAT).to_string(),
            remote_ip: meta.remote_ip.clone(),
            user_agent: meta.user_agent.clone(),
            utm: utm.clone(),
            ..LeadPayload::default()
        };

        for (field, source) in mapping.assignments() {
            let value = match source {
                FieldSource::Field(key) => submission.get(key).unwrap_or_default(),
                FieldSource::MultipleFields | FieldSource::NoAssignment => "",
            };
            match field {
                LogicalField::Name => payload.name = value.to_string(),
                LogicalField::LastName => append_last_name(&mut payload.name, value),
                LogicalField::Email => payload.email = value.to_string(),
                LogicalField::Phone => payload.phone = value.to_string(),
                LogicalField::Message => payload.message = value.to_string(),
            }
        }

        let unmapped: Vec<&str> = submission
            .fields
            .keys()
            .map(String::as_str)
            .filter(|key| !mapping.references(key) && !self.is_infrastructure_field(key))
            .collect();

        if mapping.collects_overflow() {
            let overflow: Vec<&str> = unmapped
                .iter()
                .copied()
                .filter(|key| *key != LAST_NAME_KEY)
                .collect();
            payload.message = format!("{MULTIPLE_FIELDS}:{}", overflow.join(","));
        }

        for key in unmapped.into_iter().filter(|key| !key.contains(LAST_NAME_KEY)) {
            if let Some(value) = submission.fields.get(key) {
                payload
                    .additional_fields
                    .insert(key.to_string(), value.clone());
            }
        }

        debug!(
            additional_fields = payload.additional_fields.len(),
            overflow = mapping.collects_overflow(),
            "Lead payload assembled"
        );

        payload
    }
}

fn append_last_name(name: &mut String, last_name: &str) {
    if last_name.is_empty() {
        return;
    }
    if !name.is_empty() {
        name.push(' ');
    }
    name.push_str(last_name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubmissionMeta;
    use chrono::{TimeZone, Utc};

    fn builder() -> PayloadBuilder {
        PayloadBuilder::with_default_patterns().unwrap()
    }

    fn meta() -> SubmissionMeta {
        SubmissionMeta {
            remote_ip: "203.0.113.7".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            submitted_at: Utc.with_ymd_and_hms(2024, 5, 1, 13, 45, 9).unwrap(),
            referer: "https://example.com/contact".to_string(),
            host: "example.com".to_string(),
        }
    }

    #[test]
    fn test_reference_example() {
        let submission = Submission::new(meta())
            .with_field("your-name", "Ada")
            .with_field("your-lname", "Lovelace")
            .with_field("your-email", "a@x.com")
            .with_field("extra1", "v1");
        let mapping = FieldMapping::from_raw(
            &[
                ("name", "your-name"),
                ("last-name", "your-lname"),
                ("email", "your-email"),
                ("multiple_fields", "1"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        )
        .unwrap();

        let payload = builder().build(&submission, &mapping, &UtmContext::default(), "acme");

        assert_eq!(payload.name, "Ada Lovelace");
        assert_eq!(payload.email, "a@x.com");
        assert_eq!(payload.phone, "");
        assert_eq!(payload.message, "multiple_fields:extra1");
        assert_eq!(payload.additional_fields.len(), 1);
        assert_eq!(payload.additional_fields["extra1"], "v1");
        assert_eq!(payload.username, "acme");
    }

    #[test]
    fn test_metadata_is_copied() {
        let payload = builder().build(
            &Submission::new(meta()),
            &FieldMapping::new(),
            &UtmContext::default(),
            "",
        );

        assert_eq!(payload.site, "example.com");
        assert_eq!(payload.form_page, "https://example.com/contact");
        assert_eq!(payload.timestamp, "2024-05-01T13:45:09.000Z");
        assert_eq!(payload.remote_ip, "203.0.113.7");
        assert_eq!(payload.user_agent, "Mozilla/5.0");
    }

    #[test]
    fn test_missing_source_key_yields_empty_value() {
        let mapping = FieldMapping::new()
            .map(LogicalField::Email, "your-email")
            .map(LogicalField::Phone, "tel");
        let submission = Submission::new(meta()).with_field("tel", "555-0100");

        let payload = builder().build(&submission, &mapping, &UtmContext::default(), "");

        assert_eq!(payload.email, "");
        assert_eq!(payload.phone, "555-0100");
    }

    #[test]
    fn test_overflow_overwrites_mapped_message() {
        let mapping = FieldMapping::new()
            .map(LogicalField::Message, "your-message")
            .with_overflow();
        let submission = Submission::new(meta())
            .with_field("your-message", "hello")
            .with_field("budget", "10k")
            .with_field("city", "Paris");

        let payload = builder().build(&submission, &mapping, &UtmContext::default(), "");

        assert_eq!(payload.message, "multiple_fields:budget,city");
    }

    #[test]
    fn test_overflow_and_additional_fields_skip_infrastructure() {
        let mapping = FieldMapping::new()
            .map(LogicalField::Name, "your-name")
            .assign(LogicalField::Message, FieldSource::MultipleFields);
        let submission = Submission::new(meta())
            .with_field("_wpcf7", "12")
            .with_field("_wpcf7_unit_tag", "wpcf7-f12-p3-o1")
            .with_field("g-recaptcha-response", "token")
            .with_field("wpzerospam_key", "k")
            .with_field("your-name", "Grace")
            .with_field("last-name", "Hopper")
            .with_field("company", "Navy");

        let payload = builder().build(&submission, &mapping, &UtmContext::default(), "");

        assert_eq!(payload.message, "multiple_fields:company");
        assert_eq!(payload.additional_fields.len(), 1);
        assert_eq!(payload.additional_fields["company"], "Navy");
    }

    #[test]
    fn test_value_under_sentinel_key_is_not_forwarded() {
        let mapping = FieldMapping::from_raw(
            &[("name", "your-name"), ("multiple_fields", "1")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
        .unwrap();
        let submission = Submission::new(meta())
            .with_field("your-name", "Ada")
            .with_field("1", "checkbox")
            .with_field("city", "London");

        let payload = builder().build(&submission, &mapping, &UtmContext::default(), "");

        assert_eq!(payload.message, "multiple_fields:city");
        assert_eq!(payload.additional_fields.keys().collect::<Vec<_>>(), vec!["city"]);
    }

    #[test]
    fn test_last_name_without_name_has_no_leading_space() {
        let mapping = FieldMapping::new().map(LogicalField::LastName, "surname");
        let submission = Submission::new(meta()).with_field("surname", "Turing");

        let payload = builder().build(&submission, &mapping, &UtmContext::default(), "");

        assert_eq!(payload.name, "Turing");
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("last-name").is_none());
    }

    #[test]
    fn test_utm_keys_are_merged_only_when_present() {
        let mut utm = UtmContext::default();
        utm.set("utm_campaign", "spring".to_string());

        let payload = builder().build(&Submission::new(meta()), &FieldMapping::new(), &utm, "");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["utm_campaign"], "spring");
        assert!(json.get("utm_source").is_none());
        assert!(json.get("gclid").is_none());
    }

    #[test]
    fn test_custom_patterns_extend_infrastructure_fields() {
        let builder = PayloadBuilder::new(["_wpcf7", "^honeypot"]).unwrap();
        let submission = Submission::new(meta())
            .with_field("honeypot-1", "")
            .with_field("notes", "n");

        let payload = builder.build(&submission, &FieldMapping::new(), &UtmContext::default(), "");

        assert!(builder.is_infrastructure_field("honeypot-1"));
        assert_eq!(payload.additional_fields.keys().collect::<Vec<_>>(), vec!["notes"]);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(PayloadBuilder::new(["("]).is_err());
    }
}
