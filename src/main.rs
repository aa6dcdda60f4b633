//! Governance Audit CLI
//!
//! Command-line access to the tamper-evident governance audit log

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use governance_audit::audit::EventFilter;
use governance_audit::{AuditConfig, AuditLogger, EventType};

#[derive(Parser)]
#[command(name = "governance-audit")]
#[command(about = "Tamper-evident audit trail for AI governance activity")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL (overrides configuration)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log an event
    Log {
        /// Event type (risk_assessment, compliance_check, policy_update, ...)
        #[arg(long = "type")]
        event_type: String,

        /// Name of the governed system
        #[arg(long)]
        system: String,

        /// Who or what triggered the event
        #[arg(long)]
        actor: String,

        /// JSON object with event details
        #[arg(long, default_value = "{}")]
        details: String,
    },

    /// Query events, newest first
    Query {
        /// Filter by system name
        #[arg(long)]
        system: Option<String>,

        /// Filter by event type
        #[arg(long = "type")]
        event_type: Option<EventType>,

        /// Only events at or after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Maximum number of events
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Verify chain integrity
    Verify,

    /// Export the audit trail as markdown
    Export {
        /// Only events for this system
        #[arg(long)]
        system: Option<String>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "governance_audit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = AuditConfig::load_from(cli.config.as_deref())?;
    if let Some(database_url) = cli.database_url {
        config.database_url = database_url;
    }

    let logger = AuditLogger::open(&config).await?;
    let chain_valid = run(&logger, cli.command).await;
    logger.close().await;

    if !chain_valid? {
        std::process::exit(1);
    }
    Ok(())
}

/// Execute one command; returns `false` only when verification found tampering
async fn run(logger: &AuditLogger, command: Commands) -> Result<bool> {
    match command {
        Commands::Log {
            event_type,
            system,
            actor,
            details,
        } => {
            let details: serde_json::Value =
                serde_json::from_str(&details).context("--details must be valid JSON")?;
            let event = logger
                .log_event(&event_type, &system, &actor, &details)
                .await?;
            let short_checksum: String = event.checksum.chars().take(16).collect();
            println!(
                "Event logged: #{} [{}] checksum={}...",
                event.id, event.event_type, short_checksum
            );
        }

        Commands::Query {
            system,
            event_type,
            since,
            limit,
        } => {
            let filter = EventFilter {
                system_name: system,
                event_type,
                since,
            };
            for event in logger.query(&filter, limit).await? {
                println!("{}", event.summary());
            }
        }

        Commands::Verify => {
            let report = logger.verify_integrity().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.valid {
                for violation in &report.violations {
                    error!(
                        "Integrity violation at index {} (id {}): {}",
                        violation.index,
                        violation.id,
                        violation.kind.as_str()
                    );
                }
                return Ok(false);
            }
        }

        Commands::Export { system, output } => {
            let markdown = logger.export_markdown(system.as_deref()).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, markdown)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Audit trail exported to {}", path.display());
                }
                None => println!("{}", markdown),
            }
        }
    }

    Ok(true)
}
