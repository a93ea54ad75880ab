//! bsh record - Report a finished command (called from the shell's precmd hook).

use std::path::PathBuf;

use clap::Args;

use crate::app::AppContext;
use crate::cli::commands::resolve_cwd;
use crate::client;
use crate::daemon::protocol::{RecordRequest, Request};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// The command line as typed
    #[arg(long, allow_hyphen_values = true)]
    pub cmd: String,

    /// Shell session identifier
    #[arg(long, default_value = "")]
    pub session: String,

    /// Directory the command ran in (default: current directory)
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Exit status
    #[arg(long = "exit", default_value_t = 0, allow_negative_numbers = true)]
    pub exit_code: i32,

    /// Wall time in milliseconds
    #[arg(long = "duration", default_value_t = 0)]
    pub duration_ms: i64,
}

pub fn run(ctx: &AppContext, args: &RecordArgs) -> Result<()> {
    let request = Request::Record(RecordRequest {
        command: args.cmd.clone(),
        session_id: args.session.clone(),
        cwd: resolve_cwd(args.cwd.as_deref()),
        exit_code: args.exit_code,
        duration_ms: args.duration_ms,
    });
    let reply = client::send(&ctx.socket_path(), &request)?;
    if !ctx.quiet {
        println!("{reply}");
    }
    Ok(())
}
