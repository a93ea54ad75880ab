//! bsh daemon - Start the history daemon.

use clap::Args;
use colored::Colorize;
use tracing::info;

use crate::app::AppContext;
use crate::client;
use crate::config::Config;
use crate::daemon::{bootstrap, Server};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Stay attached to the terminal instead of detaching
    #[arg(long)]
    pub foreground: bool,

    /// Set by the detaching parent: leave the terminal's session first
    #[arg(long, hide = true, requires = "foreground")]
    pub detached: bool,
}

pub fn run(ctx: &AppContext, args: &DaemonArgs) -> Result<()> {
    let socket_path = ctx.socket_path();

    if !args.foreground {
        if client::is_daemon_running(&socket_path) {
            if !ctx.quiet {
                println!(
                    "{} daemon already running on {}",
                    "•".yellow(),
                    socket_path.display()
                );
            }
            return Ok(());
        }
        let log_path = Config::log_path();
        let pid = bootstrap::detach(ctx.config_path.as_deref(), ctx.verbosity, &log_path)?;
        if !ctx.quiet {
            println!(
                "{} daemon started (pid {pid}), logging to {}",
                "✓".green(),
                log_path.display()
            );
        }
        return Ok(());
    }

    if args.detached {
        bootstrap::start_session()?;
    }
    bootstrap::ensure_private_dir(&ctx.data_dir)?;
    let server = Server::build(&ctx.config)?;
    info!(pid = std::process::id(), "daemon running in foreground");
    server.run()
}
