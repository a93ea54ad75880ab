//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - `run()` function to execute the command

use std::path::{Path, PathBuf};

use crate::app::AppContext;
use crate::cli::Commands;
use crate::error::Result;

pub mod daemon;
pub mod import;
pub mod record;
pub mod suggest;

/// Dispatch a command to its handler
pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Daemon(args) => daemon::run(ctx, args),
        Commands::Suggest(args) => suggest::run(ctx, args),
        Commands::Record(args) => record::run(ctx, args),
        Commands::Import(args) => import::run(ctx, args),
    }
}

/// `--cwd` if given, else the process working directory, as a wire string.
pub(crate) fn resolve_cwd(explicit: Option<&Path>) -> String {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
        .map(|p: PathBuf| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}
