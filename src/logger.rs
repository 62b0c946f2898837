//! Colored terminal logging.
//!
//! Everything here writes to stderr so `index`, `rewrite -` and `nonce`
//! output can be piped.
//!
//! ```ignore
//! log!("upload"; "uploaded {} files", count);
//! debug!("rewrite"; "cache miss for {}", key);
//! ```

use std::io::{Write, stderr};
use std::sync::atomic::{AtomicBool, Ordering};

use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use owo_colors::OwoColorize;

/// Set by `--verbose`.
static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// `log!("module"; "fmt", args)`
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Like `log!`, only with `--verbose`.
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

pub fn log(module: &str, message: &str) {
    let prefix = colorize_prefix(module);
    let mut err = stderr().lock();
    execute!(err, Clear(ClearType::UntilNewLine)).ok();
    writeln!(err, "{prefix} {message}").ok();
}

/// Engines share a color: static cache green, assets cyan, server blue.
fn colorize_prefix(module: &str) -> String {
    let prefix = format!("[{module}]");
    match module {
        "index" | "rewrite" | "upload" | "sweep" => prefix.bright_green().bold().to_string(),
        "assets" => prefix.bright_cyan().bold().to_string(),
        "serve" | "worker" => prefix.bright_blue().bold().to_string(),
        "admin" => prefix.bright_magenta().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

/// Final line of a command that went through.
pub fn success(message: &str) {
    writeln!(stderr().lock(), "{} {message}", "✓".green()).ok();
}

/// Final line of a command that did not, with an optional dimmed detail.
pub fn failure(summary: &str, detail: &str) {
    let mut err = stderr().lock();
    writeln!(err, "{} {summary}", "✗".red()).ok();
    if !detail.is_empty() {
        writeln!(err, "  {}", detail.dimmed()).ok();
    }
}
