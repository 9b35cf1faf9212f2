use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use datastore_migrate::*;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.dsmigrate/dsmigrate.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    /// Repository root, overrides the configured repo_path
    #[clap(short, long)]
    repo: Option<String>,

    /// Migrate the testnet datastore
    #[clap(long)]
    testnet: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the repository version and pending migrations
    Status {
        /// Output as JSON
        #[clap(long)]
        json: bool,
    },

    /// Apply every pending migration
    Up,

    /// Revert migrations down to a version
    Down {
        /// Version to revert to
        #[clap(long)]
        to: u32,
    },

    /// Re-run the backfill of an applied migration
    Backfill {
        /// Target version of the migration whose backfill to run
        #[clap(long)]
        version: u32,

        /// Output per-table results as JSON
        #[clap(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    repository: MigrateConfig,
    ledger_version: u32,
    latest_version: u32,
    status: SchemaStatus,
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("datastore_migrate={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<MigrateConfig> {
    let mut config = MigrateConfig::new(&cli.config)?;
    if let Some(repo) = &cli.repo {
        config.repo_path = repo.clone();
    }
    if cli.testnet {
        config.network = NetworkMode::Testnet;
    }
    Ok(config)
}

fn run_status(config: &MigrateConfig, runner: &MigrationRunner, json: bool) -> Result<()> {
    let ctx = config.to_context();
    let ledger_version = ctx.ledger().read()?;
    let status = runner.status(&ctx)?;

    if json {
        let report = StatusReport {
            repository: config.clone(),
            ledger_version,
            latest_version: runner.latest_version(),
            status,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", config.summary());
        println!("Repository Version: {}", ledger_version);
        println!("Latest Supported:   {}", runner.latest_version());
        println!("Status:             {}", status);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let runner = MigrationRunner::default();

    match cli.command {
        Commands::Status { json } => run_status(&config, &runner, json)?,
        Commands::Up => {
            let version = runner.upgrade(&config.to_context())?;
            info!("Repository is at v{}", version);
        }
        Commands::Down { to } => {
            if to < runner.oldest_version() {
                return Err(anyhow!(
                    "cannot revert below v{}, the oldest supported version",
                    runner.oldest_version()
                ));
            }
            let version = runner.downgrade_to(&config.to_context(), to)?;
            info!("Repository is at v{}", version);
        }
        Commands::Backfill { version, json } => {
            let summaries = runner.rerun_backfill(&config.to_context(), version)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                for s in &summaries {
                    println!(
                        "{:<12} scanned {:>6}  skipped {:>6}  updated {:>6}",
                        s.table, s.scanned, s.skipped, s.updated
                    );
                }
            }
            info!("Backfill for v{} complete", version);
        }
        Commands::Config => {
            println!("Config File:        {}", MigrateConfig::config_file_path());
            println!("{}", config.summary());
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
