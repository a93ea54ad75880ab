//! bsh import - Seed the store from an existing shell history file.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use colored::Colorize;

use crate::app::AppContext;
use crate::client;
use crate::error::{BshError, Result};
use crate::import::zsh;
use crate::storage::{HistoryStore, RecordFilter};

#[derive(Args, Debug)]
pub struct ImportArgs {
    #[command(subcommand)]
    pub source: ImportSource,
}

#[derive(Subcommand, Debug)]
pub enum ImportSource {
    /// zsh history (plain or EXTENDED_HISTORY)
    Zsh {
        /// History file (default: $HISTFILE, then ~/.zsh_history)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

pub fn run(ctx: &AppContext, args: &ImportArgs) -> Result<()> {
    match &args.source {
        ImportSource::Zsh { file } => {
            let path = match file {
                Some(path) => path.clone(),
                None => zsh::default_history_path()?,
            };

            ensure_daemon_stopped(&ctx.socket_path())?;

            let store = HistoryStore::open(
                ctx.db_path(),
                &ctx.config.storage,
                RecordFilter::from_config(&ctx.config.record),
            )?;
            let mut writer = store.open_writer()?;
            let summary = zsh::import_file(&path, &mut writer)?;

            if !ctx.quiet {
                println!(
                    "{} imported {} of {} entries from {} into {}",
                    "✓".green(),
                    summary.stored.to_string().bold(),
                    summary.parsed,
                    path.display(),
                    store.path().display()
                );
            }
            Ok(())
        }
    }
}

/// The daemon's writer thread must stay the only writer. An import holds the
/// write lock for the whole file, long enough to starve live RECORDs.
fn ensure_daemon_stopped(socket_path: &Path) -> Result<()> {
    if client::is_daemon_running(socket_path) {
        return Err(BshError::Import(format!(
            "a daemon is running on {}; stop it before importing",
            socket_path.display()
        )));
    }
    Ok(())
}
