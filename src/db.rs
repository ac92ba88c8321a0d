use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, SubsecRound};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::models::{FieldMapping, FormSettings, LogEntry, NewLogEntry, OutboxMail};
use crate::schema::{api_log, form_settings, mail_outbox, SCHEMA_VERSION};

/// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
/// A connection checked out of the pool
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const MEMORY_URL: &str = ":memory:";

/// Database manager for the API log, form settings and mail outbox
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database at `database_url` with default pool settings
    pub fn new(database_url: &str) -> Result<Self> {
        Self::open(database_url, 10, Duration::from_secs(30))
    }

    /// Open the database described by the configuration
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::open(
            &config.url,
            config.max_connections,
            Duration::from_secs(config.connection_timeout_secs),
        )
    }

    fn open(database_url: &str, max_connections: u32, timeout: Duration) -> Result<Self> {
        let path = strip_scheme(database_url);

        // Every in-memory connection is its own database, so keep exactly one
        let builder = Pool::builder().connection_timeout(timeout);
        let pool = if path == MEMORY_URL {
            builder
                .max_size(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .build(SqliteConnectionManager::memory())?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            builder
                .max_size(max_connections)
                .build(
                    SqliteConnectionManager::file(path)
                        .with_init(|conn| conn.busy_timeout(Duration::from_secs(5))),
                )?
        };

        // Run migrations
        let conn = pool.get()?;
        Self::run_migrations(&conn)?;
        info!(path, "Database ready");

        Ok(Self { pool })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!("../migrations/2026-10-19-000000_create_api_log/up.sql"))?;
        conn.execute_batch(include_str!("../migrations/2026-10-19-000001_create_form_settings/up.sql"))?;
        conn.execute_batch(include_str!("../migrations/2026-10-19-000002_create_mail_outbox/up.sql"))?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Schema version recorded by the migrations, 0 after teardown
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.get_connection()?;
        Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    /// True when the migrations have run on this database
    pub fn is_current(&self) -> Result<bool> {
        Ok(self.schema_version()? == SCHEMA_VERSION)
    }

    /// Append one request/response pair to the API log
    pub fn append_log(&self, entry: NewLogEntry) -> Result<LogEntry> {
        let conn = self.get_connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}) VALUES (?, ?, ?, ?)",
                api_log::TABLE,
                api_log::TIME,
                api_log::FORM_ID,
                api_log::REQUEST,
                api_log::RESPONSE
            ),
            params![entry.time, entry.form_id, entry.request, entry.response],
        )?;

        let id = conn.last_insert_rowid();
        debug!(id, form_id = entry.form_id, "API log entry appended");

        Ok(LogEntry {
            id,
            time: entry.time,
            form_id: entry.form_id,
            request: entry.request,
            response: entry.response,
        })
    }

    /// Log entries, newest first
    pub fn list_logs(&self, limit: Option<usize>) -> Result<Vec<LogEntry>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {}, {}, {}, {} FROM {} ORDER BY {} DESC, {} DESC LIMIT ?",
            api_log::ID,
            api_log::TIME,
            api_log::FORM_ID,
            api_log::REQUEST,
            api_log::RESPONSE,
            api_log::TABLE,
            api_log::TIME,
            api_log::ID
        ))?;

        let entries = stmt
            .query_map(params![sql_limit(limit)], map_log_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Log entries for one form, newest first
    pub fn logs_for_form(&self, form_id: i64) -> Result<Vec<LogEntry>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {}, {}, {}, {} FROM {} WHERE {} = ? ORDER BY {} DESC, {} DESC",
            api_log::ID,
            api_log::TIME,
            api_log::FORM_ID,
            api_log::REQUEST,
            api_log::RESPONSE,
            api_log::TABLE,
            api_log::FORM_ID,
            api_log::TIME,
            api_log::ID
        ))?;

        let entries = stmt
            .query_map(params![form_id], map_log_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Number of log entries
    pub fn count_logs(&self) -> Result<i64> {
        let conn = self.get_connection()?;
        Ok(conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", api_log::TABLE),
            [],
            |row| row.get(0),
        )?)
    }

    /// Insert or replace the settings for a form
    pub fn save_form_settings(
        &self,
        form_id: i64,
        mapping: &FieldMapping,
        enabled: bool,
    ) -> Result<FormSettings> {
        let conn = self.get_connection()?;
        let updated_at = now();
        let mapping_json = serde_json::to_string(mapping)?;

        conn.execute(
            &format!(
                "INSERT INTO {table} ({id}, {enabled}, {mapping}, {updated}) VALUES (?, ?, ?, ?) \
                 ON CONFLICT({id}) DO UPDATE SET {enabled} = excluded.{enabled}, \
                 {mapping} = excluded.{mapping}, {updated} = excluded.{updated}",
                table = form_settings::TABLE,
                id = form_settings::FORM_ID,
                enabled = form_settings::ENABLED,
                mapping = form_settings::MAPPING,
                updated = form_settings::UPDATED_AT
            ),
            params![form_id, enabled, mapping_json, updated_at],
        )?;

        Ok(FormSettings {
            form_id,
            enabled,
            mapping: mapping.clone(),
            updated_at,
        })
    }

    /// Settings for one form, if any were saved
    pub fn get_form_settings(&self, form_id: i64) -> Result<Option<FormSettings>> {
        let conn = self.get_connection()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {}, {}, {}, {} FROM {} WHERE {} = ?",
                    form_settings::FORM_ID,
                    form_settings::ENABLED,
                    form_settings::MAPPING,
                    form_settings::UPDATED_AT,
                    form_settings::TABLE,
                    form_settings::FORM_ID
                ),
                params![form_id],
                map_settings_row,
            )
            .optional()?;

        row.map(SettingsRow::into_settings).transpose()
    }

    /// Settings for every configured form, by form id
    pub fn list_form_settings(&self) -> Result<Vec<FormSettings>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {}, {}, {} FROM {} ORDER BY {}",
            form_settings::FORM_ID,
            form_settings::ENABLED,
            form_settings::MAPPING,
            form_settings::UPDATED_AT,
            form_settings::TABLE,
            form_settings::FORM_ID
        ))?;

        let rows = stmt
            .query_map([], map_settings_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(SettingsRow::into_settings).collect()
    }

    /// Toggle a form without touching its mapping; false if the form has no settings
    pub fn set_form_enabled(&self, form_id: i64, enabled: bool) -> Result<bool> {
        let conn = self.get_connection()?;
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET {} = ?, {} = ? WHERE {} = ?",
                form_settings::TABLE,
                form_settings::ENABLED,
                form_settings::UPDATED_AT,
                form_settings::FORM_ID
            ),
            params![enabled, now(), form_id],
        )?;
        Ok(updated > 0)
    }

    /// Forget a form's settings; false if there were none
    pub fn delete_form_settings(&self, form_id: i64) -> Result<bool> {
        let conn = self.get_connection()?;
        let deleted = conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?",
                form_settings::TABLE,
                form_settings::FORM_ID
            ),
            params![form_id],
        )?;
        Ok(deleted > 0)
    }

    /// Queue a maintainer email for the host mailer
    pub fn queue_mail(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        content_type: &str,
    ) -> Result<OutboxMail> {
        let conn = self.get_connection()?;
        let queued_at = now();
        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?)",
                mail_outbox::TABLE,
                mail_outbox::QUEUED_AT,
                mail_outbox::RECIPIENT,
                mail_outbox::SUBJECT,
                mail_outbox::BODY,
                mail_outbox::CONTENT_TYPE
            ),
            params![queued_at, recipient, subject, body, content_type],
        )?;

        Ok(OutboxMail {
            id: conn.last_insert_rowid(),
            queued_at,
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            content_type: content_type.to_string(),
            sent_at: None,
        })
    }

    /// Mail not yet reported sent, oldest first
    pub fn pending_mail(&self) -> Result<Vec<OutboxMail>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {}, {}, {}, {}, {}, {} FROM {} WHERE {} IS NULL ORDER BY {}",
            mail_outbox::ID,
            mail_outbox::QUEUED_AT,
            mail_outbox::RECIPIENT,
            mail_outbox::SUBJECT,
            mail_outbox::BODY,
            mail_outbox::CONTENT_TYPE,
            mail_outbox::SENT_AT,
            mail_outbox::TABLE,
            mail_outbox::SENT_AT,
            mail_outbox::ID
        ))?;

        let mail = stmt
            .query_map([], |row| {
                Ok(OutboxMail {
                    id: row.get(0)?,
                    queued_at: row.get(1)?,
                    recipient: row.get(2)?,
                    subject: row.get(3)?,
                    body: row.get(4)?,
                    content_type: row.get(5)?,
                    sent_at: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(mail)
    }

    /// Record that the host mailer sent a queued email
    pub fn mark_mail_sent(&self, id: i64) -> Result<bool> {
        let conn = self.get_connection()?;
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET {} = ? WHERE {} = ? AND {} IS NULL",
                mail_outbox::TABLE,
                mail_outbox::SENT_AT,
                mail_outbox::ID,
                mail_outbox::SENT_AT
            ),
            params![now(), id],
        )?;
        Ok(updated > 0)
    }

    /// Drop every table. This is the only operation that removes log entries.
    pub fn teardown(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(include_str!("../migrations/2026-10-19-000002_create_mail_outbox/down.sql"))?;
        conn.execute_batch(include_str!("../migrations/2026-10-19-000001_create_form_settings/down.sql"))?;
        conn.execute_batch(include_str!("../migrations/2026-10-19-000000_create_api_log/down.sql"))?;
        conn.execute_batch("PRAGMA user_version = 0;")?;
        info!("All feed tables dropped");
        Ok(())
    }
}

struct SettingsRow {
    form_id: i64,
    enabled: bool,
    mapping: String,
    updated_at: NaiveDateTime,
}

impl SettingsRow {
    fn into_settings(self) -> Result<FormSettings> {
        Ok(FormSettings {
            form_id: self.form_id,
            enabled: self.enabled,
            mapping: serde_json::from_str(&self.mapping)?,
            updated_at: self.updated_at,
        })
    }
}

fn map_settings_row(row: &Row<'_>) -> rusqlite::Result<SettingsRow> {
    Ok(SettingsRow {
        form_id: row.get(0)?,
        enabled: row.get(1)?,
        mapping: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

fn map_log_entry(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get(0)?,
        time: row.get(1)?,
        form_id: row.get(2)?,
        request: row.get(3)?,
        response: row.get(4)?,
    })
}

fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

// SQLite treats a negative LIMIT as unbounded
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.and_then(|n| i64::try_from(n).ok()).unwrap_or(-1)
}

fn strip_scheme(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogicalField;

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_scheme("sqlite://data/feed.db"), "data/feed.db");
        assert_eq!(strip_scheme("sqlite:data/feed.db"), "data/feed.db");
        assert_eq!(strip_scheme("sqlite::memory:"), ":memory:");
        assert_eq!(strip_scheme("/tmp/feed.db"), "/tmp/feed.db");
    }

    #[test]
    fn test_memory_database_runs_migrations() {
        let db = Database::new("sqlite::memory:").unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(db.count_logs().unwrap(), 0);
    }

    #[test]
    fn test_logs_are_listed_newest_first() {
        let db = Database::new(":memory:").unwrap();
        for form_id in [1, 2, 3] {
            db.append_log(NewLogEntry::now(form_id, "{}".into(), "\"ok\"".into()))
                .unwrap();
        }

        let logs = db.list_logs(Some(2)).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].form_id, 3);
        assert_eq!(logs[1].form_id, 2);
        assert_eq!(db.list_logs(None).unwrap().len(), 3);
    }

    #[test]
    fn test_form_settings_upsert() {
        let db = Database::new(":memory:").unwrap();
        let first = FieldMapping::new().map(LogicalField::Name, "your-name");
        let second = first.clone().map(LogicalField::Email, "your-email");

        db.save_form_settings(7, &first, true).unwrap();
        db.save_form_settings(7, &second, false).unwrap();

        let settings = db.get_form_settings(7).unwrap().unwrap();
        assert_eq!(settings.mapping, second);
        assert!(!settings.enabled);
        assert_eq!(db.list_form_settings().unwrap().len(), 1);
    }

    #[test]
    fn test_teardown_resets_schema_version() {
        let db = Database::new(":memory:").unwrap();
        db.teardown().unwrap();
        assert_eq!(db.schema_version().unwrap(), 0);
        assert!(db.count_logs().is_err());
    }
}
