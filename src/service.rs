//! The feed pipeline: submission -> payload -> delivery -> log.
//!
//! `LeadFeed` is the application context. It is built once from configuration
//! and handed to whatever receives form submissions.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::client::{HttpLeadsApi, LeadsApi};
use crate::config::{ApiConfig, AppConfig, NotifyConfig};
use crate::db::Database;
use crate::error::{LeadFeedError, Result};
use crate::logging::OperationTimer;
use crate::metrics;
use crate::models::{
    CredentialTestResult, FieldMapping, FormSettings, LeadPayload, LogEntry, NewLogEntry,
    Submission, UtmContext, CREDENTIAL_TEST_FORM_ID,
};
use crate::notify::{FailureNotice, Notifier, OutboxNotifier};
use crate::payload::PayloadBuilder;
use crate::validation::InputValidator;

/// Why a submission was not fed to the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No API key is configured
    MissingApiKey,
    /// The form has no saved field mapping
    NoSettings,
    /// The form's feed is switched off
    Disabled,
}

impl SkipReason {
    /// Stable label for logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingApiKey => "missing_api_key",
            Self::NoSettings => "no_settings",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Nothing was sent
    Skipped(SkipReason),
    /// The API answered; any status counts
    Delivered {
        /// HTTP status of the answer
        status: u16,
        /// Log entry written for the attempt, if the log accepted it
        log_id: Option<i64>,
    },
    /// The request never got an answer
    Failed {
        /// Transport error message
        error: String,
        /// Log entry written for the attempt, if the log accepted it
        log_id: Option<i64>,
    },
}

#[derive(Serialize)]
struct CredentialProbe<'a> {
    username: &'a str,
    site: &'a str,
}

/// Application context wiring settings, the API client, the log store and the notifier
pub struct LeadFeed<A, N> {
    api_config: ApiConfig,
    notify_config: NotifyConfig,
    cookie_prefix: String,
    db: Database,
    api: A,
    notifier: N,
    builder: PayloadBuilder,
}

impl LeadFeed<HttpLeadsApi, OutboxNotifier> {
    /// Wire the HTTP client and the outbox notifier from configuration
    pub fn from_config(config: &AppConfig, db: Database) -> Result<Self> {
        let api = HttpLeadsApi::from_config(&config.api)?;
        let notifier = OutboxNotifier::new(db.clone());
        Self::new(config, db, api, notifier)
    }
}

impl<A: LeadsApi, N: Notifier> LeadFeed<A, N> {
    /// Wire a context from explicit parts
    pub fn new(config: &AppConfig, db: Database, api: A, notifier: N) -> Result<Self> {
        Ok(Self {
            api_config: config.api.clone(),
            notify_config: config.notify.clone(),
            cookie_prefix: config.feed.cookie_prefix.clone(),
            db,
            api,
            notifier,
            builder: PayloadBuilder::new(&config.feed.ignored_field_patterns)?,
        })
    }

    /// The underlying store
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Assemble the payload a submission would produce under `mapping`
    #[must_use]
    pub fn build_payload(
        &self,
        submission: &Submission,
        mapping: &FieldMapping,
        cookies: &HashMap<String, String>,
    ) -> LeadPayload {
        let utm = UtmContext::from_cookies(cookies, &self.cookie_prefix);
        self.builder
            .build(submission, mapping, &utm, &self.api_config.username)
    }

    /// Feed one form submission to the API.
    ///
    /// Transport failures are reported through the outcome, never as an error,
    /// so the end user's submission still succeeds.
    pub async fn on_submission(
        &self,
        form_id: i64,
        submission: &Submission,
        cookies: &HashMap<String, String>,
    ) -> Result<FeedOutcome> {
        if self.api_config.key.is_empty() {
            return Ok(self.skip(form_id, SkipReason::MissingApiKey));
        }

        let Some(settings) = self.db.get_form_settings(form_id)? else {
            return Ok(self.skip(form_id, SkipReason::NoSettings));
        };
        if !settings.enabled {
            return Ok(self.skip(form_id, SkipReason::Disabled));
        }

        let payload = self.build_payload(submission, &settings.mapping, cookies);
        self.deliver(form_id, &payload).await
    }

    /// Send a payload once and log the attempt.
    ///
    /// A log write that fails is recorded and reported as a missing `log_id`;
    /// it never turns the attempt into an error, and a transport failure is
    /// always passed to the notifier.
    pub async fn deliver(&self, form_id: i64, payload: &LeadPayload) -> Result<FeedOutcome> {
        let request = serde_json::to_string(payload)?;
        let timer = OperationTimer::new("deliver_lead");

        match self.api.post_lead(&request, &self.api_config.key).await {
            Ok(response) => {
                metrics::record_delivery("delivered", timer.finish());
                let logged = serde_json::to_string(&response)?;
                let log_id = self.try_append_log(NewLogEntry::now(form_id, request, logged));
                info!(form_id, status = response.status, ?log_id, "Lead delivered");
                Ok(FeedOutcome::Delivered {
                    status: response.status,
                    log_id,
                })
            }
            Err(err) => {
                metrics::record_delivery("transport_error", timer.finish());
                let message = err.message().to_string();
                warn!(form_id, error = %message, "Lead delivery failed");

                let entry = NewLogEntry::now(form_id, request.clone(), serde_json::to_string(&message)?);
                let notice = FailureNotice::new(&self.notify_config, entry.time, &message, &request);
                let log_id = self.try_append_log(entry);

                if let Err(notify_err) = self.notifier.notify(&notice).await {
                    metrics::record_error("notification", "deliver");
                    error!(form_id, error = %notify_err, "Maintainer notification failed");
                }

                Ok(FeedOutcome::Failed {
                    error: message,
                    log_id,
                })
            }
        }
    }

    /// Check a candidate username and key against the verification endpoint.
    ///
    /// Only HTTP 200 counts as success. Exactly one log entry is written.
    pub async fn test_credentials(
        &self,
        username: &str,
        api_key: &str,
        site: Option<&str>,
    ) -> Result<CredentialTestResult> {
        let site = site.unwrap_or(&self.api_config.site);
        let request = serde_json::to_string(&CredentialProbe { username, site })?;
        let timer = OperationTimer::new("test_credentials");

        let (status, response) = match self.api.verify_credentials(&request, api_key).await {
            Ok(response) => (Some(response.status), serde_json::to_string(&response)?),
            Err(err) => (None, serde_json::to_string(err.message())?),
        };
        timer.finish();

        let success = status == Some(200);
        metrics::record_credential_test(success);

        let entry = self.append_log(CREDENTIAL_TEST_FORM_ID, request, response.clone())?;
        info!(username, success, ?status, log_id = entry.id, "Credential test finished");

        Ok(CredentialTestResult {
            success,
            status,
            response,
            log_id: entry.id,
        })
    }

    /// Save the mapping for a form
    pub fn configure_form(
        &self,
        form_id: i64,
        mapping: &FieldMapping,
        enabled: bool,
    ) -> Result<FormSettings> {
        InputValidator::validate_form_id(form_id)
            .and_then(|()| InputValidator::validate_mapping(mapping))
            .map_err(|e| LeadFeedError::InvalidMapping(e.to_string()))?;

        let settings = self.db.save_form_settings(form_id, mapping, enabled)?;
        info!(form_id, enabled, "Form feed settings saved");
        Ok(settings)
    }

    /// Switch a configured form on or off; false if it has no settings
    pub fn set_form_enabled(&self, form_id: i64, enabled: bool) -> Result<bool> {
        self.db.set_form_enabled(form_id, enabled)
    }

    /// Forget a form's settings; false if it had none
    pub fn remove_form(&self, form_id: i64) -> Result<bool> {
        self.db.delete_form_settings(form_id)
    }

    /// Settings of every configured form
    pub fn forms(&self) -> Result<Vec<FormSettings>> {
        self.db.list_form_settings()
    }

    /// Log entries, newest first
    pub fn logs(&self, limit: Option<usize>) -> Result<Vec<LogEntry>> {
        self.db.list_logs(limit)
    }

    /// Drop the log, settings and outbox tables
    pub fn teardown(&self) -> Result<()> {
        warn!("Tearing down all feed tables");
        self.db.teardown()
    }

    fn skip(&self, form_id: i64, reason: SkipReason) -> FeedOutcome {
        metrics::record_skip(reason.as_str());
        debug!(form_id, %reason, "Submission not fed");
        FeedOutcome::Skipped(reason)
    }

    fn try_append_log(&self, entry: NewLogEntry) -> Option<i64> {
        let form_id = entry.form_id;
        match self.db.append_log(entry) {
            Ok(logged) => Some(logged.id),
            Err(err) => {
                metrics::record_error("database", "append_log");
                error!(form_id, error = %err, "Failed to write API log entry");
                None
            }
        }
    }

    fn append_log(&self, form_id: i64, request: String, response: String) -> Result<LogEntry> {
        self.db
            .append_log(NewLogEntry::now(form_id, request, response))
            .inspect_err(|_| metrics::record_error("database", "append_log"))
    }
}
