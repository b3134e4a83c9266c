use std::path::PathBuf;

use anyhow::{Context, Result};
use bastion_core::config::{self, Config};
use bastion_core::logging;
use clap::Parser;

#[derive(Parser)]
#[command(name = "bastion")]
#[command(version)]
#[command(about = "Discord SQL console and mail relay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: $BASTION_HOME/config.toml)
    #[arg(long, global = true, env = "BASTION_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the bot, reading gateway events from stdin (default)
    Run,
    /// Create the database tables and exit
    InitDb,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(config::paths::config_path);
    let config = Config::load_from(&path)?;
    let _log_guard = logging::init(&config.log)?;
    if path.exists() {
        tracing::info!("Config file: {}", path.display());
    }

    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move {
        match cli.command.unwrap_or(Commands::Run) {
            Commands::Run => bastion_bot::run(config).await,
            Commands::InitDb => {
                let database = bastion_bot::init_db(&config).await?;
                println!("Initialized {}", database.path().display());
                Ok(())
            }
        }
    })
}
