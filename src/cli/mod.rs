//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;

/// bsh - shell history daemon with context-aware suggestions
#[derive(Parser, Debug)]
#[command(name = "bsh")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Config file path (default: ~/.config/bsh/config.toml)
    #[arg(long, global = true, env = "BSH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the history daemon
    Daemon(commands::daemon::DaemonArgs),

    /// Ask the daemon for suggestions matching a prefix
    Suggest(commands::suggest::SuggestArgs),

    /// Report an executed command to the daemon
    Record(commands::record::RecordArgs),

    /// Import history from another shell
    Import(commands::import::ImportArgs),
}

impl Commands {
    /// Shell-hook commands stay silent when the daemon is down.
    pub const fn is_hook(&self) -> bool {
        matches!(self, Self::Suggest(_) | Self::Record(_))
    }
}
