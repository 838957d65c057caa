//! Scrapestore CLI - save, query and inspect a scraper's SQLite store

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use scrapestore::config;
use scrapestore::output::OutputMode;
use scrapestore::{RunLog, SqliteStore};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "scrapestore")]
#[command(version)]
#[command(about = "Schema-inferring persistence for scraper output")]
#[command(long_about = r#"
Scrapestore keeps loosely-typed records in a single SQLite file:
  • Tables and columns are created as records arrive
  • Records with a unique key update the existing row
  • Named variables and a run log live alongside your data

Example usage:
  scrapestore save --unique-key id '{"id": 1, "name": "Ada"}'
  scrapestore select "* from swdata where id = ?" --param 1
  scrapestore save-var last_page 42
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Record the command's outcome in the run log
    #[arg(long, global = true)]
    runlog: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and create the database
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// Save a JSON object, or an array of objects
    Save {
        /// Target table (defaults to the configured default table)
        #[arg(short, long)]
        table: Option<String>,

        /// Unique key column; repeat for a composite key
        #[arg(short, long = "unique-key")]
        unique_key: Vec<String>,

        /// Records as JSON
        records: String,
    },

    /// Run `SELECT <fragment>`
    Select {
        /// Everything after SELECT, e.g. "* from swdata where id = ?"
        fragment: String,

        /// Positional parameter; repeat for more
        #[arg(short, long)]
        param: Vec<String>,
    },

    /// Run any single SQL statement
    Execute {
        sql: String,

        /// Positional parameter; repeat for more
        #[arg(short, long)]
        param: Vec<String>,
    },

    /// Print a named variable
    GetVar {
        name: String,
    },

    /// Save a named variable (value as JSON, or plain text)
    SaveVar {
        name: String,
        value: String,
    },

    /// List tables with row counts, columns and unique keys
    Tables,

    /// Report the run status to the hosting environment
    Status {
        /// ok | error
        status: String,

        /// Optional message sent with the status
        #[arg(short, long)]
        message: Option<String>,
    },
}

/// Combine the command's outcome with closing the store.
///
/// The command's own error wins; a close failure after it is only logged.
fn finish(outcome: anyhow::Result<()>, closed: scrapestore::Result<()>) -> anyhow::Result<()> {
    match (outcome, closed) {
        (Err(err), Err(close_err)) => {
            tracing::error!("failed to close store: {}", close_err);
            Err(err)
        }
        (Ok(()), Err(close_err)) => Err(close_err.into()),
        (outcome, Ok(())) => outcome,
    }
}

/// Run-log name for a failed command
fn error_kind(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<scrapestore::Error>()
        .map(scrapestore::Error::kind)
        .unwrap_or("Error")
}

fn dispatch(store: &mut SqliteStore, command: &Commands, output_mode: OutputMode) -> anyhow::Result<()> {
    match command {
        Commands::Save { table, unique_key, records } => {
            commands::run_save(store, table.as_deref(), unique_key, records, output_mode)
        }
        Commands::Select { fragment, param } => commands::run_select(store, fragment, param, output_mode),
        Commands::Execute { sql, param } => commands::run_execute(store, sql, param, output_mode),
        Commands::GetVar { name } => commands::run_get_var(store, name, output_mode),
        Commands::SaveVar { name, value } => commands::run_save_var(store, name, value, output_mode),
        Commands::Tables => commands::run_tables(store, output_mode),
        Commands::Init { .. } | Commands::Status { .. } => Ok(()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for results
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = OutputMode::from_flags(cli.json);
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = config::load_config(Some(&config_path))?.unwrap_or_default();
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    tracing::debug!(database = %config.database.display(), "using database");

    match &cli.command {
        Commands::Init { force } => return commands::run_init(&config_path, &config, *force, output_mode),
        Commands::Status { status, message } => {
            return commands::run_status(status, message.as_deref(), output_mode);
        }
        _ => {}
    }

    config::ensure_db_dir(&config.database)?;
    let mut store = SqliteStore::from_config(&config)?;

    let outcome = if cli.runlog {
        let log = RunLog::setup();
        tracing::info!(run_id = log.run_id(), "logging run");
        let outcome = dispatch(&mut store, &cli.command, output_mode);
        let kind = outcome.as_ref().err().map(error_kind);
        if let Err(e) = log.record(&mut store, kind) {
            tracing::error!("failed to write run log: {}", e);
        }
        outcome
    } else {
        dispatch(&mut store, &cli.command, output_mode)
    };

    finish(outcome, store.close())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_save() {
        let cli = Cli::try_parse_from([
            "scrapestore", "--json", "save", "-t", "people", "-u", "id", "-u", "name", r#"{"id": 1}"#,
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Save { table, unique_key, records } => {
                assert_eq!(table.as_deref(), Some("people"));
                assert_eq!(unique_key, vec!["id", "name"]);
                assert_eq!(records, r#"{"id": 1}"#);
            }
            _ => panic!("expected save"),
        }
    }

    #[test]
    fn test_error_kind_of_store_errors() {
        let err = anyhow::Error::new(scrapestore::Error::StorageLocked { attempts: 5 });
        assert_eq!(error_kind(&err), "StorageLockedError");
        assert_eq!(error_kind(&anyhow::anyhow!("plain")), "Error");
    }

    #[test]
    fn test_command_error_outranks_close_error() {
        let closed = Err(scrapestore::Error::StorageLocked { attempts: 5 });
        let err = finish(Err(anyhow::anyhow!("bad JSON")), closed).unwrap_err();
        assert_eq!(err.to_string(), "bad JSON");
    }

    #[test]
    fn test_close_error_surfaces_after_success() {
        let closed = Err(scrapestore::Error::StorageLocked { attempts: 5 });
        let err = finish(Ok(()), closed).unwrap_err();
        assert_eq!(error_kind(&err), "StorageLockedError");
        assert!(finish(Ok(()), Ok(())).is_ok());
    }
}
