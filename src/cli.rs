//! Command-line interface definition using clap
//!
//! Provides structured argument parsing with automatic help generation.

use crate::record::Level;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Client for the log-sink service
#[derive(Parser, Debug)]
#[command(name = "log-sink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file (default: ./log-sink.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Server URL (overrides config)
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// User name (overrides config)
    #[arg(long, value_name = "USER")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do once connected
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write one log record and wait for the server's confirmation
    Send {
        /// Record name
        #[arg(long)]
        name: String,

        /// debug, info, warn, error or fatal
        #[arg(long, default_value = "info")]
        level: Level,

        #[arg(long)]
        message: Option<String>,

        /// Extra data as JSON
        #[arg(long, value_name = "JSON")]
        extra: Option<String>,
    },

    /// Print live records until interrupted
    Tail {
        /// Only records with this exact name
        #[arg(long)]
        name: Option<String>,

        /// Minimum level
        #[arg(long, value_name = "LEVEL")]
        level_min: Option<Level>,

        #[arg(long)]
        include_extra: bool,
    },

    /// Print past records
    Query {
        /// Only records with this exact name
        #[arg(long)]
        name: Option<String>,

        /// How far back to look (default: 24 hours)
        #[arg(long, value_name = "MINUTES")]
        since_minutes: Option<i64>,

        /// Maximum records (overrides config)
        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        include_extra: bool,
    },

    /// Print the origins this user may read
    Permissions,
}

// =============================================================================
// Tests
// =============================================================================
