//! Error types for declaration extraction and classification

use thiserror::Error;

/// Result type for model-layer operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while extracting declarations or classifying attributes
#[derive(Error, Debug)]
pub enum ModelError {
    /// Statement could not be split into lhs/rhs/flags
    #[error("Malformed declaration '{statement}': {reason}")]
    MalformedDeclaration {
        /// Offending statement text
        statement: String,
        /// Reason the statement was rejected
        reason: String,
    },

    /// Attribute name declared more than once
    #[error("Attribute '{name}' is declared more than once")]
    DuplicateAttribute {
        /// Repeated attribute name
        name: String,
    },

    /// Flag outside the recognized set
    #[error("Unknown flag '{flag}' on attribute '{attribute}'")]
    UnknownFlag {
        /// Unrecognized flag token
        flag: String,
        /// Attribute the flag was attached to
        attribute: String,
    },

    /// Two flags that cannot be combined
    #[error("Incompatible flags '{first}' and '{second}' on attribute '{attribute}'")]
    IncompatibleFlags {
        /// Attribute carrying the flags
        attribute: String,
        /// First flag
        first: String,
        /// Conflicting flag
        second: String,
    },

    /// A flag value or right-hand side that should be a literal is not one
    #[error("Invalid literal '{value}' for attribute '{attribute}': {reason}")]
    InvalidLiteral {
        /// Attribute being classified
        attribute: String,
        /// Text that failed to parse
        value: String,
        /// Reason the literal was rejected
        reason: String,
    },
}

impl ModelError {
    /// Create a malformed-declaration error
    pub fn malformed(statement: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDeclaration {
            statement: statement.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown-flag error
    pub fn unknown_flag(flag: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::UnknownFlag {
            flag: flag.into(),
            attribute: attribute.into(),
        }
    }

    /// Create an invalid-literal error
    pub fn invalid_literal(
        attribute: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidLiteral {
            attribute: attribute.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
