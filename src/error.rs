//! Crate-wide error type.
//!
//! Every variant carries a human-readable message; the binary maps the variant
//! to a process exit code.

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MixfitError {
    /// Invalid engine, factory, or limit settings. Raised before any fitting.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Measurement data that cannot be fitted (empty, mismatched, non-finite).
    #[error("invalid input: {0}")]
    Input(String),
    /// The minimizer could not start or failed while fitting.
    #[error("optimization failed: {0}")]
    Optimization(String),
    /// File system failures in the CLI paths.
    #[error("{0}")]
    Io(String),
}

impl MixfitError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn optimization(message: impl Into<String>) -> Self {
        Self::Optimization(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Input(_) => 3,
            Self::Optimization(_) => 4,
            Self::Io(_) => 5,
        }
    }
}
