//! Dotted config field paths.

use std::fmt;

use owo_colors::OwoColorize;

/// Where a rejected value lives, e.g. `serve.nonce_secret`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPath(&'static str);

impl FieldPath {
    pub const fn new(path: &'static str) -> Self {
        Self(path)
    }

    pub const fn as_str(&self) -> &'static str {
        self.0
    }

    /// Section the field belongs to (`serve` for `serve.port`).
    pub fn section(&self) -> &'static str {
        self.0.split('.').next().unwrap_or(self.0)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.section().dimmed(), self.0.cyan())
    }
}
