//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Deliver local theme, plugin and core assets through a CDN
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: edgeshift.toml)
    #[arg(short = 'C', long, global = true, default_value = crate::config::CONFIG_FILE, value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the active URL → file map as JSON
    #[command(visible_alias = "i")]
    Index {
        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Rewrite a rendered HTML document
    #[command(visible_alias = "r")]
    Rewrite {
        /// HTML file to rewrite, `-` for stdin
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,

        /// Request URI the document was rendered for (cache key)
        #[arg(short, long, default_value = "/")]
        uri: String,

        /// Write output to file instead of stdout
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        output: Option<PathBuf>,
    },

    /// Upload every pending file and asset
    Sweep,

    /// Run a registration pass over `[[assets.paths]]` and list parents
    #[command(visible_alias = "a")]
    Assets {
        /// Also upload children without a remote copy
        #[arg(short, long)]
        sync: bool,
    },

    /// Purge an asset parent and its children
    Purge {
        /// Parent id (see `edgeshift assets`)
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<u64>,

        /// Purge every parent
        #[arg(short, long)]
        all: bool,
    },

    /// Clear upload error counters so failed files are retried
    ResetErrors {
        /// Only this file (default: every file)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: Option<PathBuf>,
    },

    /// Issue an admin action nonce
    Nonce {
        /// Action name (cache-clear, cache-overlay)
        action: String,
    },

    /// Start the rewrite and admin server
    #[command(visible_alias = "s")]
    Serve {
        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<std::net::IpAddr>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

