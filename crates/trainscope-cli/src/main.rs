//! Trainscope Command-Line Interface
//!
//! Watch a model training run: model details, scalar charts and image
//! summaries, refreshed periodically until training finishes.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

use trainscope_api::Channel;

mod commands;
mod config;
mod surface;

use commands::{cancel, summaries, watch};
use config::{FileConfig, Overrides, Settings};

/// Trainscope - monitor model training runs from the terminal
#[derive(Parser)]
#[command(name = "trainscope")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Backend base URL
    #[arg(long, env = "TRAINSCOPE_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Bearer token for the backend
    #[arg(long, env = "TRAINSCOPE_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Config file (defaults to ~/.trainscope/config.yaml)
    #[arg(long, env = "TRAINSCOPE_CONFIG", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a training run until it finishes
    Watch {
        /// Model UUID
        #[arg(short, long)]
        model: String,

        /// Refresh interval in minutes (1-60)
        #[arg(short, long)]
        interval: Option<u32>,

        /// Start on the images tab instead of the charts
        #[arg(long)]
        images: bool,

        /// Exit once training is done
        #[arg(long)]
        exit_when_done: bool,
    },

    /// Request cancellation of a training run
    Cancel {
        /// Model UUID
        #[arg(short, long)]
        model: String,
    },

    /// Fetch summaries once and print them as JSON
    Summaries {
        /// Model UUID
        #[arg(short, long)]
        model: String,

        /// Channel to fetch (scalars, images)
        #[arg(short, long, default_value = "scalars")]
        channel: Channel,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        let (interval, exit_when_done) = match &self.command {
            Commands::Watch {
                interval,
                exit_when_done,
                ..
            } => (*interval, *exit_when_done),
            _ => (None, false),
        };
        Overrides {
            endpoint: self.connection.endpoint.clone(),
            token: self.connection.token.clone(),
            refresh_interval_minutes: interval,
            exit_when_done,
        }
    }

    fn settings(&self) -> anyhow::Result<Settings> {
        let file = FileConfig::load(self.connection.config.as_deref())?;
        Settings::resolve(file, self.overrides())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over -v
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Execute command
    let result = match cli.settings() {
        Ok(settings) => match &cli.command {
            Commands::Watch { model, images, .. } => {
                watch::execute(&settings, model, *images).await
            }
            Commands::Cancel { model } => cancel::execute(&settings, model).await,
            Commands::Summaries { model, channel } => {
                summaries::execute(&settings, model, *channel).await
            }
        },
        Err(e) => Err(e),
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
