use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::routes::Route;

#[derive(Parser, Debug)]
#[command(name = "pitch-finder")]
#[command(version)]
#[command(about = "Find the key a cover was sung in and the key that suits your voice")]
pub struct Args {
    /// Path to the TOML config file (defaults to ./pitch-finder.toml if present)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Create an account (does not sign in)
    Register { email: String, password: String },

    /// Sign in and keep the session for later commands
    Login { email: String, password: String },

    /// End the current session
    Logout,

    /// Show the signed-in account
    Whoami,

    /// Print the virtual keyboard with layout offsets
    Keyboard,

    /// Show or set your vocal range
    Range {
        #[command(subcommand)]
        action: RangeAction,
    },

    /// Compare an original track with a cover
    Compare {
        original_url: String,
        cover_url: String,
        /// Highest note to send instead of the stored range (e.g. mid2G or G4)
        #[arg(long, requires = "low")]
        high: Option<String>,
        /// Lowest note to send instead of the stored range
        #[arg(long, requires = "high")]
        low: Option<String>,
    },

    /// List your comparison history
    History,

    /// Print shell completions
    Completions { shell: Shell },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum RangeAction {
    /// Print the stored range
    Show,
    /// Store a new range; keys by id (A2) or display name (lowA)
    Set {
        #[arg(long)]
        low: String,
        #[arg(long)]
        high: String,
    },
}

impl Command {
    /// The view a command belongs to, used to run the session gate.
    pub fn route(&self) -> Route {
        match self {
            Command::Register { .. } => Route::Register,
            Command::Login { .. } | Command::Logout | Command::Whoami => Route::Entry,
            Command::Keyboard | Command::Completions { .. } => Route::Entry,
            Command::Range { .. } => Route::Range,
            Command::Compare { .. } => Route::Compare,
            Command::History => Route::Dashboard,
        }
    }
}

/// Filter directive for the subscriber when `RUST_LOG` is unset.
pub fn resolve_log_filter(verbose: bool, configured: &str) -> String {
    if verbose {
        "pitch_finder=debug".to_string()
    } else {
        configured.to_string()
    }
}
