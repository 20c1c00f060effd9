pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::cli::config::ConfigOverrides;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every (query, difficulty) cell and save the results
    Run {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Show the cells a run would fetch without sending requests
    Plan {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Inspect or create configuration documents
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved configuration
    Show {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Write a starter configuration document
    Init {
        /// Destination (.json or .yaml); defaults to the user config directory
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// How the process should exit after a command succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Everything requested was done
    Full,
    /// Output was written but some cells failed or never ran
    Partial,
}

impl Completion {
    pub fn exit_code(&self) -> i32 {
        match self {
            Completion::Full => 0,
            Completion::Partial => 2,
        }
    }
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<Completion> {
    match cli.command {
        Commands::Run { overrides } => {
            info!("Starting keyword sweep");
            commands::run(overrides).await
        }
        Commands::Plan { overrides } => {
            commands::plan(overrides)?;
            Ok(Completion::Full)
        }
        Commands::Config { action } => {
            match action {
                Some(ConfigAction::Init { path, force }) => commands::init_config(path, force)?,
                Some(ConfigAction::Show { overrides }) => commands::show_config(overrides)?,
                None => commands::show_config(ConfigOverrides::default())?,
            }
            Ok(Completion::Full)
        }
    }
}
