//! CLI Module
//!
//! Command-line interface for the MVR audio player.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// MVR Audio - unlock gate, playlist and background intensity simulator
#[derive(Parser, Debug)]
#[command(name = "mvr-audio")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Default log filter for the chosen verbosity
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a script of timed user actions and print the session view
    #[command(name = "simulate")]
    Simulate {
        /// JSON script: [{"at_ms": 0, "action": "enter"}, ...]
        #[arg(short, long)]
        script: PathBuf,

        /// Playlist file (defaults to the label rotation)
        #[arg(short, long)]
        playlist: Option<PathBuf>,

        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Keep preferences in this directory instead of memory
        #[arg(long)]
        prefs_dir: Option<PathBuf>,

        /// Resume this session id (requires --prefs-dir)
        #[arg(long, requires = "prefs_dir")]
        session: Option<String>,
    },

    /// Print the playlist
    #[command(name = "playlist")]
    Playlist {
        /// Playlist file (defaults to the label rotation)
        #[arg(short, long)]
        playlist: Option<PathBuf>,
    },

    /// Inspect or clear stored preferences
    #[command(name = "prefs")]
    Prefs {
        #[command(subcommand)]
        command: PrefsCommand,
    },

    /// Print the effective configuration
    #[command(name = "config")]
    Config {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
    /// Show stored volume and sessions
    Show {
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Delete all stored preferences
    Reset {
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Delete session records older than the given age
    Prune {
        #[arg(short, long)]
        dir: PathBuf,

        /// Maximum age in hours
        #[arg(long, default_value_t = 24)]
        max_age_hours: i64,
    },
}
