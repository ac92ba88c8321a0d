//! Command-line front end for the lead feed.
#![allow(clippy::print_stdout)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};

use lead_feed::config::AppConfig;
use lead_feed::db::Database;
use lead_feed::logging::init_logging;
use lead_feed::models::{FieldMapping, LogicalField, Submission};
use lead_feed::service::{FeedOutcome, LeadFeed};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a recorded form submission to the leads API
    Submit {
        /// Id of the submitting form
        #[arg(short, long)]
        form_id: i64,

        /// JSON file with `fields`, `meta` and optional `cookies`
        #[arg(short = 'i', long)]
        file: PathBuf,
    },
    /// Print the payload a submission would produce, without sending it
    Preview {
        /// Id of the submitting form
        #[arg(short, long)]
        form_id: i64,

        /// JSON file with `fields`, `meta` and optional `cookies`
        #[arg(short = 'i', long)]
        file: PathBuf,
    },
    /// Check a username and API key against the verification endpoint
    TestCredentials {
        /// API username
        #[arg(short, long)]
        username: String,

        /// Candidate API key
        #[arg(short, long)]
        key: String,

        /// Site name (defaults to the configured site)
        #[arg(short, long)]
        site: Option<String>,
    },
    /// List the logical lead fields a form field can be mapped to
    Fields,
    /// Manage per-form field mappings
    Forms {
        #[command(subcommand)]
        command: FormsCommand,
    },
    /// Show the API request/response log, newest first
    Logs {
        /// Maximum number of entries
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Only entries for this form
        #[arg(short, long)]
        form_id: Option<i64>,
    },
    /// Show maintainer emails waiting for the host mailer
    Outbox {
        /// Mark a queued email as sent
        #[arg(long)]
        mark_sent: Option<i64>,
    },
    /// Drop the log, settings and outbox tables
    Teardown {
        /// Confirm the teardown
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum FormsCommand {
    /// List configured forms
    List,
    /// Save the mapping for a form from a YAML or JSON file
    Set {
        /// Form id
        #[arg(short, long)]
        form_id: i64,

        /// Mapping file, e.g. `name: your-name`
        #[arg(short = 'i', long)]
        file: PathBuf,

        /// Save the mapping without enabling the feed
        #[arg(long)]
        disabled: bool,
    },
    /// Feed submissions of a configured form
    Enable {
        /// Form id
        form_id: i64,
    },
    /// Stop feeding a form but keep its mapping
    Disable {
        /// Form id
        form_id: i64,
    },
    /// Forget a form's mapping
    Remove {
        /// Form id
        form_id: i64,
    },
}

/// A recorded submission as read from disk
#[derive(Deserialize)]
struct SubmissionFile {
    #[serde(flatten)]
    submission: Submission,
    #[serde(default)]
    cookies: HashMap<String, String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    let log_file = config.logging.file_path.as_deref().map(Path::new);
    let _guard = init_logging(
        Some(&config.get_log_level()),
        log_file,
        config.logging.format == "json",
    )?;

    // Parse command line arguments
    let cli = Cli::parse();

    let mut db_config = config.database.clone();
    db_config.url = config.get_database_url();
    let db = Database::from_config(&db_config).context("Failed to open database")?;
    let feed = LeadFeed::from_config(&config, db)?;

    match cli.command {
        Commands::Submit { form_id, file } => submit(&feed, form_id, &file).await?,
        Commands::Preview { form_id, file } => preview(&feed, form_id, &file)?,
        Commands::TestCredentials { username, key, site } => {
            let result = feed.test_credentials(&username, &key, site.as_deref()).await?;
            if result.success {
                println!("Credentials accepted");
            } else {
                println!("Credentials rejected: {}", result.response);
            }
        }
        Commands::Fields => {
            for field in LogicalField::ALL {
                println!("{:<10} {}", field.as_str(), field.title());
            }
        }
        Commands::Forms { command } => manage_forms(&feed, command)?,
        Commands::Logs { limit, form_id } => show_logs(&feed, limit, form_id)?,
        Commands::Outbox { mark_sent } => {
            let db = feed.database();
            if let Some(id) = mark_sent {
                if !db.mark_mail_sent(id)? {
                    bail!("No pending email with id {id}");
                }
            }
            for mail in db.pending_mail()? {
                println!("#{} {} to {}: {}", mail.id, mail.queued_at, mail.recipient, mail.subject);
            }
        }
        Commands::Teardown { yes } => {
            if !yes {
                bail!("Teardown deletes every log entry and mapping; pass --yes to confirm");
            }
            feed.teardown()?;
        }
    }

    Ok(())
}

fn read_submission(path: &Path) -> Result<SubmissionFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read submission file {}", path.display()))?;
    serde_json::from_str(&raw).context("Failed to parse submission file")
}

/// Feed a recorded submission
async fn submit<A, N>(feed: &LeadFeed<A, N>, form_id: i64, path: &Path) -> Result<()>
where
    A: lead_feed::LeadsApi,
    N: lead_feed::notify::Notifier,
{
    let file = read_submission(path)?;
    match feed.on_submission(form_id, &file.submission, &file.cookies).await? {
        FeedOutcome::Skipped(reason) => warn!(form_id, %reason, "Submission skipped"),
        FeedOutcome::Delivered { status, log_id } => {
            info!(form_id, status, ?log_id, "Submission delivered");
        }
        FeedOutcome::Failed { error, log_id } => {
            warn!(form_id, ?log_id, error = %error, "Submission failed");
        }
    }
    Ok(())
}

/// Print the payload a submission would produce
fn preview<A, N>(feed: &LeadFeed<A, N>, form_id: i64, path: &Path) -> Result<()>
where
    A: lead_feed::LeadsApi,
    N: lead_feed::notify::Notifier,
{
    let file = read_submission(path)?;
    let settings = feed
        .database()
        .get_form_settings(form_id)?
        .with_context(|| format!("Form {form_id} has no field mapping"))?;
    let payload = feed.build_payload(&file.submission, &settings.mapping, &file.cookies);
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn manage_forms<A, N>(feed: &LeadFeed<A, N>, command: FormsCommand) -> Result<()>
where
    A: lead_feed::LeadsApi,
    N: lead_feed::notify::Notifier,
{
    match command {
        FormsCommand::List => {
            for settings in feed.forms()? {
                println!(
                    "{} [{}] {}",
                    settings.form_id,
                    if settings.enabled { "enabled" } else { "disabled" },
                    serde_json::to_string(&settings.mapping)?
                );
            }
        }
        FormsCommand::Set { form_id, file, disabled } => {
            let mapping = read_mapping(&file)?;
            feed.configure_form(form_id, &mapping, !disabled)?;
        }
        FormsCommand::Enable { form_id } => {
            if !feed.set_form_enabled(form_id, true)? {
                bail!("Form {form_id} has no field mapping");
            }
        }
        FormsCommand::Disable { form_id } => {
            if !feed.set_form_enabled(form_id, false)? {
                bail!("Form {form_id} has no field mapping");
            }
        }
        FormsCommand::Remove { form_id } => {
            if !feed.remove_form(form_id)? {
                warn!(form_id, "Form had no field mapping");
            }
        }
    }
    Ok(())
}

fn read_mapping(path: &Path) -> Result<FieldMapping> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mapping file {}", path.display()))?;
    let mapping = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&raw).context("Failed to parse JSON mapping")?
    } else {
        serde_yaml::from_str(&raw).context("Failed to parse YAML mapping")?
    };
    Ok(mapping)
}

/// Print log entries with pretty-printed request and response
fn show_logs<A, N>(feed: &LeadFeed<A, N>, limit: usize, form_id: Option<i64>) -> Result<()>
where
    A: lead_feed::LeadsApi,
    N: lead_feed::notify::Notifier,
{
    let entries = match form_id {
        Some(id) => feed
            .database()
            .logs_for_form(id)?
            .into_iter()
            .take(limit)
            .collect(),
        None => feed.logs(Some(limit))?,
    };

    if entries.is_empty() {
        println!("There are currently no logs in the table.");
        return Ok(());
    }

    for entry in entries {
        println!("{} form {} (#{})", entry.time, entry.form_id, entry.id);
        println!("request:\n{}", pretty_json(&entry.request));
        println!("response:\n{}\n", pretty_json(&entry.response));
    }
    Ok(())
}

fn pretty_json(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| raw.to_string())
}
