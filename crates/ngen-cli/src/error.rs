//! Error handling for the ngen CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Declaration extraction or classification error
    #[error("Model error: {0}")]
    Model(#[from] ngen_model::ModelError),

    /// Analysis error
    #[error("Analysis error: {0}")]
    Analyzer(#[from] ngen_analyzer::AnalyzerError),

    /// Emission error
    #[error("Emitter error: {0}")]
    Emit(#[from] ngen_codegen::EmitError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Model file could not be parsed
    #[error("Model file error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid command arguments
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// Generic error
    #[error("Error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl CliError {
    /// Create an invalid-arguments error
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArgs(msg.into())
    }
}
