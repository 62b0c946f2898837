//! Configuration errors and collected validation findings.

use std::fmt;
use std::path::PathBuf;

use owo_colors::OwoColorize;
use thiserror::Error;

use super::FieldPath;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid TOML")]
    Toml(#[from] toml::de::Error),

    // no #[from]: a source() would print every finding twice
    #[error("{0}")]
    Diagnostics(ConfigDiagnostics),
}

/// One rejected field.
#[derive(Debug, Clone)]
struct Finding {
    field: FieldPath,
    message: String,
    hint: Option<String>,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  {} {}: {}", "×".red(), self.field, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n    {} {}", "hint:".yellow(), hint)?;
        }
        Ok(())
    }
}

/// Every section validates into one of these so all problems are
/// reported at once.
#[derive(Debug, Default)]
pub struct ConfigDiagnostics {
    findings: Vec<Finding>,
}

impl ConfigDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: FieldPath, message: impl Into<String>) {
        self.push(field, message.into(), None);
    }

    pub fn error_with_hint(
        &mut self,
        field: FieldPath,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.push(field, message.into(), Some(hint.into()));
    }

    fn push(&mut self, field: FieldPath, message: String, hint: Option<String>) {
        self.findings.push(Finding {
            field,
            message,
            hint,
        });
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.findings.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ConfigDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} rejected)",
            "invalid edgeshift config".red().bold(),
            self.findings.len()
        )?;
        for finding in &self.findings {
            write!(f, "\n{finding}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigDiagnostics {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_error_names_file() {
        let err = ConfigError::Io(
            PathBuf::from("edgeshift.toml"),
            Error::new(ErrorKind::NotFound, "file not found"),
        );
        assert_eq!(err.to_string(), "cannot read `edgeshift.toml`");
    }

    #[test]
    fn test_findings_collect() {
        assert!(ConfigDiagnostics::new().into_result().is_ok());

        let mut diag = ConfigDiagnostics::new();
        diag.error(FieldPath::new("assets.paths"), "[0] url is empty");
        diag.error_with_hint(FieldPath::new("site.url"), "missing", "set it");
        assert_eq!(diag.len(), 2);

        let err = diag.into_result().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("2 rejected"));
        assert!(text.contains("set it"));
        assert!(text.find("assets.paths") < text.find("site.url"));
    }
}
