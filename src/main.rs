//! permadex CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use permadex::{
    commands::{
        cmd_changed, cmd_continue, cmd_deleted, cmd_get, cmd_init, cmd_list, cmd_lookup,
        cmd_rebuild, cmd_remove, cmd_reset, cmd_status, print_continue, print_event, print_init,
        print_rebuild_report, print_record, print_records, print_reset, print_status,
        ListOptions, RebuildOptions,
    },
    config::Config,
    content::ContentId,
    error::{Error, Result},
    progress::LogWriterFactory,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "permadex")]
#[command(version, about = "Permalink index with resumable rebuilds", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize permadex configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show index and rebuild status
    Status,

    /// Rebuild the whole index from the content database
    Rebuild {
        /// Run only the first chunk; advance later with 'permadex continue'
        #[arg(long)]
        detach: bool,
    },

    /// Run one step of the rebuild in progress
    Continue,

    /// Abandon the rebuild in progress
    Reset,

    /// Content was created or edited
    Changed {
        /// Content ID
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },

    /// Content was deleted
    Deleted {
        /// Content ID
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },

    /// Remove one record from the index
    Remove {
        /// Content ID
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },

    /// Find the content ID that owns a locator
    Lookup {
        /// Locator (permalink) to resolve
        locator: String,
    },

    /// Show the indexed locator of a content ID
    Get {
        /// Content ID
        id: ContentId,
    },

    /// List index records in ID order
    List {
        /// Records to skip
        #[arg(long, default_value = "0")]
        offset: u64,

        /// Maximum records to show
        #[arg(short, long, default_value = "50")]
        limit: u64,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory))
        .with(filter)
        .init();

    let json = cli.json;

    match cli.command {
        Commands::Init { force } => {
            let base_dir = cli.config.as_deref().map(base_dir_for);
            let info = cmd_init(base_dir, force).await?;
            output(json, &info, print_init)?;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "permadex", &mut std::io::stdout());
        }

        command => {
            let config = load_config(cli.config.as_deref())?;
            handle_command(&config, command, json).await?;
        }
    }

    Ok(())
}

async fn handle_command(config: &Config, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Status => {
            let status = cmd_status(config).await?;
            output(json, &status, print_status)?;
        }

        Commands::Rebuild { detach } => {
            let report = cmd_rebuild(config, RebuildOptions { detach }).await?;
            output(json, &report, print_rebuild_report)?;
        }

        Commands::Continue => {
            let report = cmd_continue(config).await?;
            output(json, &report, print_continue)?;
        }

        Commands::Reset => {
            let report = cmd_reset(config).await?;
            output(json, &report, print_reset)?;
        }

        Commands::Changed { id } => {
            let report = cmd_changed(config, id).await?;
            output(json, &report, print_event)?;
        }

        Commands::Deleted { id } => {
            let report = cmd_deleted(config, id).await?;
            output(json, &report, print_event)?;
        }

        Commands::Remove { id } => {
            let report = cmd_remove(config, id).await?;
            output(json, &report, print_event)?;
        }

        Commands::Lookup { locator } => {
            let record = cmd_lookup(config, &locator).await?;
            output(json, &record, |r| print_record(r.as_ref()))?;
        }

        Commands::Get { id } => {
            let record = cmd_get(config, id).await?;
            output(json, &record, |r| print_record(r.as_ref()))?;
        }

        Commands::List { offset, limit } => {
            let page = cmd_list(config, ListOptions { offset, limit }).await?;
            output(json, &page, print_records)?;
        }
    }

    Ok(())
}

fn output<T: Serialize>(json: bool, value: &T, print: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(())
}

/// `--config` may name a .toml file or the directory holding it
fn base_dir_for(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|e| e == "toml") {
        path.parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir)
    } else {
        path.to_path_buf()
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => path.to_path_buf(),
        Some(dir) => dir.join("config.toml"),
        None => Config::default_config_path(),
    };

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
