//! Subcommand implementations

pub mod completions;
pub mod config;
pub mod pair;
pub mod run;
pub mod stats;
pub mod sync;
