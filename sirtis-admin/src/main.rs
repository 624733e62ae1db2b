//! SIRTIS Admin CLI Tool
//!
//! Operator commands for identifier allocation and authorization checks:
//! schema setup, issuing or previewing case/call numbers, and testing a
//! subject against the policy table.

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use colored::Colorize;
use sirtis::authz::{PgSubjectStore, SessionPayload};
use sirtis::sequence::{EntityKind, PgIdentifierStore, SystemClock};
use sirtis::{connect, schema, PgExecutor, SirtisConfig};
use sirtis_admin::{commands, AdminError};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "sirtis-admin")]
#[command(about = "Identifier allocation and authorization tool for SIRTIS")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Configuration file
    #[arg(long, default_value = sirtis::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the counter table and unique identifier indexes
    InitSchema,

    /// Allocate the next case or call number
    NextId {
        /// Entity kind (case or call)
        #[arg(long)]
        kind: EntityKind,

        /// Year to allocate in (default: current year)
        #[arg(long)]
        year: Option<i32>,

        /// Insert the identifier into its table
        #[arg(long)]
        record: bool,

        /// Allocate against an in-memory store, without a database
        #[arg(long)]
        dry_run: bool,

        /// Identifiers to seed the in-memory store with (with --dry-run)
        #[arg(long = "existing", requires = "dry_run")]
        existing: Vec<String>,
    },

    /// Break an identifier down into kind, year and sequence
    Parse {
        identifier: String,
    },

    /// Check whether a subject may perform an operation
    #[command(group(ArgGroup::new("subject").required(true).args(["user", "session_json"])))]
    Check {
        /// Operation name (e.g. calls.view)
        #[arg(long)]
        operation: String,

        /// Look the subject up in the users table
        #[arg(long)]
        user: Option<Uuid>,

        /// Session payload: {"user_id": ..., "roles": [...], "permissions": [...]}
        #[arg(long)]
        session_json: Option<String>,
    },

    /// Print the effective policy table as TOML
    Policies {
        /// Override file layered over the builtin table
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    if cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();
    } else if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match run(cli.command, cli.database_url, &cli.config) {
        Ok(()) => {
            if !cli.quiet {
                println!("{}", "✅ Success".green());
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{} {:#}", "❌ Error:".red(), e);
            process::exit(1);
        }
    }
}

fn run(command: Commands, database_url: Option<String>, config_path: &Path) -> anyhow::Result<()> {
    let config = SirtisConfig::load_from(config_path).context("failed to load configuration")?;
    let executor = || -> Result<PgExecutor, AdminError> {
        let url = commands::database_url(database_url.clone(), &config);
        Ok(PgExecutor::new(connect(&url)?))
    };

    match command {
        Commands::InitSchema => {
            let executor = executor()?;
            schema::ensure_all(&executor, &config.allocator.columns)
                .map_err(AdminError::from)?;
            println!("Counter table and identifier indexes are in place");
        }
        Commands::NextId {
            kind,
            year,
            record,
            dry_run,
            existing,
        } => {
            let clock = Arc::new(SystemClock);
            let id = if dry_run {
                commands::next_id_dry_run(&config.allocator, clock, kind, year, &existing, record)?
            } else {
                let mut store = PgIdentifierStore::with_columns(
                    executor()?,
                    config.allocator.columns.clone(),
                );
                commands::next_id(&mut store, &config.allocator, clock, kind, year, record)?
            };
            log::info!(
                "Allocated {id} using {} strategy{}",
                config.allocator.strategy.as_str(),
                if record { " (recorded)" } else { "" }
            );
            println!("{}", id.to_string().bold());
        }
        Commands::Parse { identifier } => {
            let report = commands::parse_report(&identifier)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Check {
            operation,
            user,
            session_json,
        } => {
            let resolver = config.authz.resolver()?;
            let subject = match user {
                Some(user_id) => {
                    let store =
                        PgSubjectStore::with_columns(executor()?, config.authz.subjects.clone());
                    commands::check(&resolver, &store.for_session(Some(user_id)), &operation)?
                }
                None => commands::check(&resolver, &SessionPayload(session_json), &operation)?,
            };
            println!(
                "{} {} may perform {}",
                "ALLOW".green().bold(),
                subject.user_id,
                operation
            );
        }
        Commands::Policies { file } => {
            let mut authz = config.authz.clone();
            if file.is_some() {
                authz.policy_file = file;
            }
            let table = authz.policy_table()?;
            print!("{}", commands::render_policies(&table)?);
        }
    }

    Ok(())
}
