//! CLI dispatcher for the application binary.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::perception::{self, AppConfig, PipelineOptions};

/// Parse CLI arguments and run the requested subcommand.
pub fn dispatch() -> Result<()> {
    let cli = AppCli::parse();
    match cli.command {
        Command::Run(args) => {
            let mut config = load_config(args.config.as_deref())?;
            if let Some(source) = args.source {
                config.camera.source = source;
            }
            if args.no_dashboard {
                config.metrics.enable_console_log = false;
            }
            config.validate()?;

            let options = PipelineOptions {
                run_limit: args.run_seconds.map(Duration::from_secs),
            };
            perception::run(config, options)
        }
        Command::CheckConfig { config } => {
            let config = load_config(Some(config.as_path()))?;
            config.validate()?;
            println!("{config:#?}");
            Ok(())
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

#[derive(Debug, Parser)]
#[command(name = "dashcam", version, about = "Dashcam perception pipeline")]
struct AppCli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the live pipeline until interrupted or a time limit elapses.
    Run(RunArgs),
    /// Validate a configuration file and print the effective settings.
    CheckConfig {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Path to the TOML configuration file; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stop automatically after this many seconds.
    #[arg(long)]
    run_seconds: Option<u64>,
    /// Capture source override (`synthetic` or an image directory).
    #[arg(long)]
    source: Option<String>,
    /// Disable the terminal dashboard regardless of configuration.
    #[arg(long)]
    no_dashboard: bool,
}
