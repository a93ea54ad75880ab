use std::io;

use thiserror::Error;

use crate::daemon::protocol::ProtocolError;

#[derive(Error, Debug)]
pub enum BshError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Migration to version {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    #[error("Write queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("Write queue is closed")]
    QueueClosed,

    #[error("Daemon not reachable at {0}")]
    DaemonUnavailable(String),

    #[error("Import failed: {0}")]
    Import(String),
}

pub type Result<T> = std::result::Result<T, BshError>;
