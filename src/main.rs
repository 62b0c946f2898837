//! edgeshift - deliver locally hosted site assets through a remote CDN.
//!
//! The host hooks on `AssetRegistry` are called by the embedding site, not
//! by these commands.

#![allow(dead_code)]

mod admin;
mod asset;
mod cache;
mod cli;
mod config;
mod logger;
mod remote;
mod store;
mod utils;

use std::sync::Arc;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::common::Engines;
use cli::{Cli, Commands};
use config::Settings;

use crate::cache::DeferredRequest;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    cli::serve::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let mut settings = Settings::load(&cli.config)?;

    if let Commands::Serve { interface, port } = &cli.command {
        settings.apply_serve_options(*interface, *port);
        return cli::serve::bind_server(settings)?.run();
    }

    // One-shot commands record sweep requests instead of running them
    let background = Arc::new(DeferredRequest::default());
    let engines = Engines::open(settings, background.clone())?;

    match &cli.command {
        Commands::Index { pretty } => cli::cache::print_index(&engines, *pretty),
        Commands::Rewrite { file, uri, output } => {
            cli::cache::rewrite_file(&engines, &background, file, uri, output.as_deref())
        }
        Commands::Sweep => cli::cache::sweep(&engines),
        Commands::Assets { sync } => cli::assets::run_assets(&engines, *sync),
        Commands::Purge { id, all } => cli::assets::purge(&engines, *id, *all),
        Commands::ResetErrors { file } => cli::cache::reset_errors(&engines, file.as_deref()),
        Commands::Nonce { action } => cli::assets::print_nonce(&engines, action),
        Commands::Serve { .. } => Ok(()),
    }
}
