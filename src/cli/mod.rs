//! Command-line interface module.

mod args;
pub mod assets;
pub mod cache;
pub mod common;
pub mod serve;

pub use args::{Cli, Commands};
