use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dated_migrator::utils::CONFIG_FILE;
use dated_migrator::{create_manager, read_config, MigrationOperation, MigratorConfig, RunMode};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Dated migrator - applies date-folder migrations exactly once, in order
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "MIGRATOR_CONFIG", default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Directory holding the YYYY-MM-DD migration folders
    #[arg(long, env = "MIGRATOR_PATH")]
    migrations: Option<PathBuf>,

    /// Ledger file tracking operation state
    #[arg(long, env = "MIGRATOR_LEDGER")]
    ledger: Option<PathBuf>,

    /// SQLite database SQL migrations run against
    #[arg(long, env = "MIGRATOR_DATABASE")]
    database: Option<PathBuf>,

    /// Interpreter for script migrations
    #[arg(long, env = "MIGRATOR_PHP")]
    php: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run all pending migrations
    Migrate {
        /// Leave completed operations in place when a migration fails
        #[arg(long)]
        no_rollback: bool,
    },
    /// Roll back the most recently completed operations
    Rollback {
        #[arg(short, long, default_value_t = 1)]
        steps: usize,
    },
    /// Show completed and pending migrations
    Status,
    /// List pending migrations without running them
    Pending,
    /// Show the ledger rows of one task
    History { task: String },
    /// Check completed operations against the files on disk
    Verify,
}

impl Args {
    fn resolve_config(&self) -> anyhow::Result<MigratorConfig> {
        let mut config = read_config(&self.config)
            .with_context(|| format!("failed to read {}", self.config.display()))?
            .unwrap_or_default();

        if let Some(path) = &self.migrations {
            config.migrations_path = path.clone();
        }
        if let Some(path) = &self.ledger {
            config.ledger_path = path.clone();
        }
        if let Some(path) = &self.database {
            config.database_path = path.clone();
        }
        if let Some(path) = &self.php {
            config.php_binary = path.clone();
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = args.resolve_config()?;
    let manager = create_manager(&config)?;

    match args.command {
        Command::Migrate { no_rollback } => {
            let mode = if no_rollback || !config.auto_rollback {
                RunMode::Manual
            } else {
                RunMode::Compensate
            };
            let attempted = manager.migrate_with(mode)?;
            for migration in &attempted {
                println!("migrated {} ({})", migration.name(), migration.description());
            }
            info!(count = attempted.len(), "Done");
        }
        Command::Rollback { steps } => {
            for record in manager.rollback(steps)? {
                println!("rolled back {}", record.label());
            }
        }
        Command::Status => {
            let report = manager.get_status()?;
            for migration in &report.executed {
                println!("[x] {} {}", migration.name(), migration.description());
            }
            for migration in &report.pending {
                println!("[ ] {} {}", migration.name(), migration.description());
            }
        }
        Command::Pending => {
            for migration in manager.get_pending_migrations()? {
                println!("{} ({} operations)", migration.name(), migration.operations().len());
            }
        }
        Command::History { task } => {
            for record in manager.history(&task)? {
                println!(
                    "v{} {} {} {}",
                    record.version, record.migration_date, record.status, record.description
                );
            }
        }
        Command::Verify => {
            let drifts = manager.verify()?;
            for drift in &drifts {
                println!(
                    "{} v{}: recorded {} but file is {}",
                    drift.task_name, drift.version, drift.recorded, drift.current
                );
            }
            if !drifts.is_empty() {
                bail!("{} completed operation(s) changed on disk", drifts.len());
            }
        }
    }

    Ok(())
}
