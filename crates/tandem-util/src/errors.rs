use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for Tandem operations outside of the solver itself.
#[derive(Debug, Error, Diagnostic)]
pub enum TandemError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resolver configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    #[diagnostic(help("Check the [resolver] table of tandem.toml"))]
    Config { message: String },

    /// A registry or opam repository lookup failed.
    #[error("Registry error: {message}")]
    Registry { message: String },

    /// Reading or writing a lockfile failed.
    #[error("Lockfile error: {message}")]
    Lockfile { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

impl TandemError {
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }
}
