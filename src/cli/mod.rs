//! CLI module for the PMP fetch cache
//!
//! Provides subcommands for driving a cached fetch from the terminal:
//! - `get`: fetch an endpoint through the shared cache and print the state

pub mod get;

use clap::{Parser, Subcommand};

/// PMP Fetch - Cached, coalesced fetching of remote JSON resources
#[derive(Parser)]
#[command(name = "pmp-fetch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch an endpoint through the cache and print the resulting state
    Get(get::GetArgs),
}
