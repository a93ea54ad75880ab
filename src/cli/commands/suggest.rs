//! bsh suggest - Query the daemon for matching history.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use console::Term;

use crate::app::AppContext;
use crate::cli::commands::resolve_cwd;
use crate::client;
use crate::daemon::protocol::{Request, SuggestRequest};
use crate::error::Result;
use crate::storage::SearchScope;

#[derive(Args, Debug)]
pub struct SuggestArgs {
    /// Command prefix typed so far
    #[arg(default_value = "", allow_hyphen_values = true)]
    pub query: String,

    /// Search breadth
    #[arg(long, value_enum, default_value_t = ScopeArg::Global)]
    pub scope: ScopeArg,

    /// Directory used by `dir` and `branch` scopes (default: current directory)
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Only commands that exited successfully
    #[arg(long)]
    pub success: bool,

    /// Terminal width for the boxed listing (default: detected)
    #[arg(long)]
    pub width: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    /// All history
    Global,
    /// Current directory only
    Dir,
    /// Current git branch only
    Branch,
}

impl From<ScopeArg> for SearchScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Global => Self::Global,
            ScopeArg::Dir => Self::Directory,
            ScopeArg::Branch => Self::Branch,
        }
    }
}

pub fn run(ctx: &AppContext, args: &SuggestArgs) -> Result<()> {
    let reply = client::send(&ctx.socket_path(), &build_request(args))?;
    print!("{reply}");
    Ok(())
}

fn build_request(args: &SuggestArgs) -> Request {
    let scope = SearchScope::from(args.scope);
    let context = if scope == SearchScope::Global {
        String::new()
    } else {
        resolve_cwd(args.cwd.as_deref())
    };
    let terminal_width = args
        .width
        .or_else(|| Term::stdout().size_checked().map(|(_, cols)| cols));

    Request::Suggest(SuggestRequest {
        query: args.query.clone(),
        scope,
        context,
        only_success: args.success,
        terminal_width,
    })
}
