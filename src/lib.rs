pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod daemon;
pub mod error;
pub mod import;
pub mod storage;
pub mod utils;

pub use error::{BshError, Result};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
