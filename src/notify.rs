//! Maintainer notification for failed deliveries.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::info;

use crate::config::NotifyConfig;
use crate::db::Database;
use crate::error::{LeadFeedError, Result};

/// Content type of the failure email body
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// A lead that could not be delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    /// Maintainer address
    pub recipient: String,
    /// Public URL of the site the form lives on
    pub site_url: String,
    /// When the failure was logged
    pub time: NaiveDateTime,
    /// Transport error message
    pub error: String,
    /// The request body that was attempted
    pub request_body: String,
}

impl FailureNotice {
    /// Build a notice addressed per the notification settings
    #[must_use]
    pub fn new(config: &NotifyConfig, time: NaiveDateTime, error: &str, request_body: &str) -> Self {
        Self {
            recipient: config.maintainer_email.clone(),
            site_url: config.site_url.clone(),
            time,
            error: error.to_string(),
            request_body: request_body.to_string(),
        }
    }

    /// Email subject line
    #[must_use]
    pub fn subject(&self) -> String {
        format!("Lead feed detected an API issue on {}", self.site_url)
    }

    /// HTML email body quoting the error and the attempted request
    #[must_use]
    pub fn body(&self) -> String {
        let error = serde_json::to_string(&self.error).unwrap_or_else(|_| self.error.clone());
        format!(
            "The following error was returned by the leads API for a form submission on {site} at {time}:\
             <br><br><pre>{error}</pre><br><br>\
             The following request was attempted.<br><br><pre>{request}</pre><br><br>\
             Forms on this site may not be reaching the leads API until this is resolved.",
            site = self.site_url,
            time = self.time.format("%Y-%m-%d %H:%M:%S"),
            error = escape_html(&error),
            request = escape_html(&self.request_body),
        )
    }
}

/// Receives failure notices
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notice
    async fn notify(&self, notice: &FailureNotice) -> Result<()>;
}

/// Queues notices as emails in the database outbox for the host mailer
#[derive(Clone)]
pub struct OutboxNotifier {
    db: Database,
}

impl OutboxNotifier {
    /// Queue into the given database
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn notify(&self, notice: &FailureNotice) -> Result<()> {
        let mail = self
            .db
            .queue_mail(
                &notice.recipient,
                &notice.subject(),
                &notice.body(),
                HTML_CONTENT_TYPE,
            )
            .map_err(|e| LeadFeedError::Notification(e.to_string()))?;
        info!(mail_id = mail.id, recipient = %mail.recipient, "Maintainer notification queued");
        Ok(())
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn notice() -> FailureNotice {
        FailureNotice {
            recipient: "dev@example.com".to_string(),
            site_url: "https://example.com".to_string(),
            time: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            error: "connection refused".to_string(),
            request_body: r#"{"name":"<Ada>"}"#.to_string(),
        }
    }

    #[test]
    fn test_body_quotes_error_and_request() {
        let body = notice().body();
        assert!(body.contains("\"connection refused\""));
        assert!(body.contains("2024-05-01 09:30:00"));
        assert!(body.contains("&lt;Ada&gt;"));
        assert_eq!(notice().subject(), "Lead feed detected an API issue on https://example.com");
    }

    #[tokio::test]
    async fn test_outbox_notifier_queues_one_mail() {
        let db = Database::new(":memory:").unwrap();
        let notifier = OutboxNotifier::new(db.clone());

        notifier.notify(&notice()).await.unwrap();

        let pending = db.pending_mail().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].recipient, "dev@example.com");
        assert_eq!(pending[0].content_type, HTML_CONTENT_TYPE);
        assert!(db.mark_mail_sent(pending[0].id).unwrap());
        assert!(db.pending_mail().unwrap().is_empty());
    }
}
