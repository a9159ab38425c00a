//! Error types for lesswatch
//!
//! Uses `thiserror` for library errors; the binary wraps them in `anyhow`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for lesswatch operations
pub type LesswatchResult<T> = Result<T, LesswatchError>;

/// Main error type for lesswatch operations
#[derive(Error, Debug)]
pub enum LesswatchError {
    /// Source stylesheet (or an imported file) does not exist
    #[error("source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Malformed LESS source, with a 1-indexed locator
    #[error("compile error in {file}:{line}:{column}: {message}")]
    Compile {
        file: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    /// An @import chain revisits a file
    #[error("import cycle in {file}: '{import}' is already being compiled")]
    ImportCycle { file: PathBuf, import: PathBuf },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file
    #[error("invalid config {path}: {message}")]
    InvalidConfig { path: PathBuf, message: String },

    /// Configuration has no build mappings
    #[error("no build mappings configured in {path}")]
    EmptyBuildTable { path: PathBuf },

    /// Watch root missing or subscription failed - fatal to the watch command
    #[error("cannot watch {path}: {message}")]
    WatchSetup { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_display_compile() {
        let err = LesswatchError::Compile {
            file: PathBuf::from("css/source/_extend.less"),
            line: 12,
            column: 3,
            message: "expected ':' in declaration".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "compile error in css/source/_extend.less:12:3: expected ':' in declaration"
        );
    }

    #[test]
    fn test_error_display_source_not_found() {
        let err = LesswatchError::SourceNotFound {
            path: PathBuf::from("missing.less"),
        };
        assert_eq!(err.to_string(), "source file not found: missing.less");
    }

    #[test]
    fn test_error_display_watch_setup() {
        let err = LesswatchError::WatchSetup {
            path: PathBuf::from("css/source"),
            message: "directory does not exist".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot watch css/source: directory does not exist"
        );
    }
}
