//! Per-invocation context shared by all subcommands.

use std::path::PathBuf;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Config,
    /// `--config` as given, forwarded to a detached daemon.
    pub config_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub verbosity: u8,
    pub quiet: bool,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref())?;
        Ok(Self {
            config,
            config_path: cli.config.clone(),
            data_dir: Config::data_dir(),
            verbosity: cli.verbose,
            quiet: cli.quiet,
        })
    }

    pub fn socket_path(&self) -> PathBuf {
        self.config.socket_path()
    }

    pub fn db_path(&self) -> PathBuf {
        self.config.db_path()
    }
}
