//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "banwarden")]
#[command(author, version, about = "CIDR ban list with chat approval and firewall sync")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive prompt accepting ban/expire commands
    Shell,

    /// Execute one command immediately, without approval
    Exec {
        /// Command text, e.g. `ban 192.0.2.1,198.51.100.0/24 3d`
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Link recorded in the ban history (defaults to `actor_link` from config)
        #[arg(long)]
        actor_link: Option<String>,
    },

    /// Print the persisted ban list as JSON
    Show {
        /// Only entries that are currently banned
        #[arg(long)]
        living: bool,
    },

    /// Expire entries whose ban ran out, then persist and reconcile
    Sweep,

    /// Print the approval request message for a slash command
    Request {
        /// Requesting user id
        #[arg(long)]
        user: String,

        /// Command text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Handle an approve/reject/cancel interaction payload (JSON file, `-` for stdin)
    Respond {
        payload: PathBuf,
    },

    /// Print the command grammar
    HelpGrammar,

    /// Show version
    Version,
}
