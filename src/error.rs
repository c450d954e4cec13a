//! Error types shared by the configuration store and the logging bootstrap.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The path does not exist or is not a regular file. Raised before any parse attempt.
    #[error("{} configuration file does not exist!", path.display())]
    MissingFile { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ini::ParseError,
    },

    #[error("parse error in {}: key '{key}' appears before any section header", path.display())]
    MissingSectionHeader { path: PathBuf, key: String },

    /// A line with no `=` or `:` folded into the following key.
    #[error("parse error in {}: malformed line near '{key}'", path.display())]
    MalformedLine { path: PathBuf, key: String },

    #[error("invalid logging configuration in {}: {reason}", path.display())]
    InvalidLogging { path: PathBuf, reason: String },

    #[error("failed to open log file {}: {source}", path.display())]
    OpenLogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("logger error: {0}")]
    Subscriber(String),
}

impl ConfigError {
    /// `true` for the precondition failure (file absent or not a regular file).
    pub fn is_missing_file(&self) -> bool {
        matches!(self, ConfigError::MissingFile { .. })
    }

    /// Rewrite the path carried by errors produced while parsing an in-memory
    /// string, once the originating file is known.
    pub(crate) fn with_path(self, file: &std::path::Path) -> Self {
        let path = file.to_path_buf();
        match self {
            ConfigError::MissingFile { .. } => ConfigError::MissingFile { path },
            ConfigError::Read { source, .. } => ConfigError::Read { path, source },
            ConfigError::Parse { source, .. } => ConfigError::Parse { path, source },
            ConfigError::MissingSectionHeader { key, .. } => {
                ConfigError::MissingSectionHeader { path, key }
            }
            ConfigError::MalformedLine { key, .. } => ConfigError::MalformedLine { path, key },
            ConfigError::InvalidLogging { reason, .. } => {
                ConfigError::InvalidLogging { path, reason }
            }
            other @ (ConfigError::OpenLogFile { .. } | ConfigError::Subscriber(_)) => other,
        }
    }
}

/// Placeholder path for errors raised while parsing text that did not come from a file.
pub(crate) fn inline_source() -> PathBuf {
    PathBuf::from("<string>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::path::Path;

    #[test]
    fn missing_file_message_contains_path() {
        let e = ConfigError::MissingFile { path: PathBuf::from("/nonexistent/path.cfg") };
        assert_eq!(e.to_string(), "/nonexistent/path.cfg configuration file does not exist!");
        assert!(e.is_missing_file());
    }

    #[test]
    fn read_error_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e = ConfigError::Read { path: PathBuf::from("a.cfg"), source: io_err };
        assert!(e.to_string().contains("cannot read a.cfg"));
        let source = e.source().expect("io cause is preserved");
        assert!(source.to_string().contains("denied"));
        assert!(!e.is_missing_file());
    }

    #[test]
    fn with_path_rewrites_inline_errors() {
        let e = ConfigError::MissingSectionHeader { path: inline_source(), key: "k".into() };
        let e = e.with_path(Path::new("/etc/x.cfg"));
        assert!(e.to_string().contains("/etc/x.cfg"));
        assert!(e.to_string().contains("'k'"));
    }

    #[test]
    fn subscriber_error_display() {
        let e = ConfigError::Subscriber("already initialized".into());
        assert!(e.to_string().contains("already initialized"));
        let _: &dyn Error = &e;
    }
}
