//! Shared helpers

pub mod git;
