//! Command-line interface for the SIAAS incident server.

mod commands;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;
pub use utils::*;

#[derive(Parser)]
#[command(name = "siaas")]
#[command(about = "Field safety incident server with live supervisory feeds")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Configuration file path (TOML)
    #[arg(long, global = true, env = "SIAAS_CONFIG_PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the JSON-RPC incident server
    Serve {
        /// Transport: stdio or socket
        #[arg(long, short = 't')]
        transport: Option<String>,

        /// Unix socket path (used when transport = "socket")
        #[arg(long, short = 's')]
        socket_path: Option<String>,
    },

    /// Write the default configuration to the default location
    Init {
        #[arg(long)]
        force: bool,
    },

    /// Inspect configuration
    Config {
        #[arg(long)]
        show: bool,

        #[arg(long)]
        validate: bool,

        /// Treat validation warnings as errors
        #[arg(long, requires = "validate")]
        strict: bool,
    },

    /// Classify a report payload offline and print the score
    Classify {
        #[arg(long, short = 'p', conflicts_with = "payload_json")]
        payload_file: Option<PathBuf>,

        #[arg(long, short = 'j', conflicts_with = "payload_file")]
        payload_json: Option<String>,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Level for the logging subscriber: flag, then settings, then `info`
    pub fn effective_log_level(&self) -> String {
        if let Some(level) = &self.log_level {
            return level.clone();
        }
        load_settings(self.config.as_deref())
            .map(|settings| settings.server.log_level)
            .unwrap_or_else(|_| "info".to_string())
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config;
        match self.command {
            Commands::Serve {
                transport,
                socket_path,
            } => serve(config, transport, socket_path, self.log_level).await,
            Commands::Init { force } => init(config, force).await,
            Commands::Config {
                show,
                validate,
                strict,
            } => show_config(config, show, validate, strict).await,
            Commands::Classify {
                payload_file,
                payload_json,
            } => classify(payload_file, payload_json).await,
            Commands::Version => version().await,
        }
    }
}
