//! Error types for the analyzer

use thiserror::Error;

use ngen_model::ModelError;

/// Result type for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Errors raised while translating equations or building descriptions
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// Extraction or classification error from the model layer
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Free identifier that is neither an attribute nor a built-in
    #[error("Unresolved symbol '{symbol}' in '{context}'")]
    UnresolvedSymbol {
        /// Offending identifier
        symbol: String,
        /// Equation or expression it appeared in
        context: String,
    },

    /// Unknown or inapplicable numerical method
    #[error("Unsupported method '{method}' for variable '{variable}': {reason}")]
    UnsupportedMethod {
        /// Method tag
        method: String,
        /// Variable carrying the tag
        variable: String,
        /// Why the method cannot be applied
        reason: String,
    },

    /// Implicit discretization could not isolate the variable
    #[error("Implicit method cannot isolate '{variable}': equation is not linear in it")]
    NonLinearImplicit {
        /// Variable that could not be isolated
        variable: String,
    },

    /// The coupled system matrix is not invertible
    #[error("Coupled system over {{{variables}}} is singular")]
    SingularCoupling {
        /// Comma-joined participating variable names
        variables: String,
    },

    /// Coupled set larger than the supported bound
    #[error("{count} coupled variables exceed the supported bound of {max}")]
    TooManyCoupled {
        /// Number of coupled variables
        count: usize,
        /// Supported bound
        max: usize,
    },

    /// A model-type-mandated variable is missing
    #[error("Model '{model}' must define the variable '{name}'")]
    MissingRequiredVariable {
        /// Required variable name
        name: String,
        /// Model name
        model: String,
    },

    /// A reserved variable was user-defined
    #[error("Model '{model}' must not define the variable '{name}': {reason}")]
    ForbiddenVariable {
        /// Reserved variable name
        name: String,
        /// Model name
        model: String,
        /// Why the name is reserved
        reason: String,
    },

    /// Post-synaptic operation not permitted for this synapse type
    #[error("Operation '{operation}' is not allowed on synapse '{synapse}': {reason}")]
    IllegalOperation {
        /// Offending operation name
        operation: String,
        /// Synapse model name
        synapse: String,
        /// Why the operation is rejected
        reason: String,
    },

    /// Pruning/creating clause without the global enable flag
    #[error("Synapse '{synapse}' declares structural plasticity but it is disabled in the configuration")]
    StructuralPlasticityDisabled {
        /// Synapse model name
        synapse: String,
    },
}

impl AnalyzerError {
    /// Create an unresolved-symbol error
    pub fn unresolved(symbol: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UnresolvedSymbol {
            symbol: symbol.into(),
            context: context.into(),
        }
    }

    /// Create an unsupported-method error
    pub fn unsupported_method(
        method: impl Into<String>,
        variable: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
            variable: variable.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_symbol_and_context() {
        let err = AnalyzerError::unresolved("taau", "tau * dr/dt + r = baseline");
        let msg = format!("{}", err);
        assert!(msg.contains("taau") && msg.contains("baseline"));
    }
}
