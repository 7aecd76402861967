//! Error types for the emitter

use thiserror::Error;

/// Result type for emitter operations
pub type Result<T> = std::result::Result<T, EmitError>;

/// Errors raised while rendering artifacts
#[derive(Error, Debug)]
pub enum EmitError {
    /// An emitter invariant was violated; always a generator defect
    #[error("Emitter bug in {artifact}: {detail}")]
    EmitterBug {
        /// Artifact being rendered
        artifact: String,
        /// Violated invariant
        detail: String,
    },

    /// Same-step variable dependencies form a cycle outside a coupled block
    #[error("Dependency cycle over {{{variables}}} in '{description}'")]
    DependencyCycle {
        /// Comma-joined cycle members
        variables: String,
        /// Description being emitted
        description: String,
    },

    /// Artifact could not be written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EmitError {
    /// Create an emitter-bug error
    pub fn bug(artifact: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::EmitterBug {
            artifact: artifact.into(),
            detail: detail.into(),
        }
    }
}
