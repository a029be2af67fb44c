//! Kiln - cache-aware bundle builder
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use kiln::cli::{Cli, Commands, LogFormat};
use kiln::config::ConfigManager;
use kiln::error::{KilnError, KilnResult};
use kiln::ui;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(lines) = e.captured_output() {
                ui::tool_output(lines);
            }
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> KilnResult<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    // Init command runs before a project exists
    if let Commands::Init(args) = cli.command {
        return kiln::cli::commands::init(args).await;
    }

    let start = match cli.project {
        Some(ref path) => path.clone(),
        None => {
            std::env::current_dir().map_err(|e| KilnError::io("getting current directory", e))?
        }
    };
    let manager = ConfigManager::discover(&start)?;
    debug!("Using config {}", manager.path().display());
    let config = manager.load().await?;

    match cli.command {
        Commands::Init(_) => unreachable!("Init handled above"),
        Commands::Build(args) => kiln::cli::commands::build(args, &manager, &config).await,
        Commands::Watch(args) => kiln::cli::commands::watch(args, &manager, &config).await,
        Commands::Cache(args) => kiln::cli::commands::cache(args, &manager, &config).await,
        Commands::Clean(args) => kiln::cli::commands::clean(args, &manager, &config).await,
        Commands::Config(args) => kiln::cli::commands::config(args, &manager, &config).await,
    }
}

/// 0 = warn (progress output only), 1 = info, 2+ = debug
fn init_logging(verbose: u8, format: LogFormat) {
    let filter = match verbose {
        0 => EnvFilter::new("kiln=warn"),
        1 => EnvFilter::new("kiln=info"),
        _ => EnvFilter::new("kiln=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.without_time().init(),
    }
}
