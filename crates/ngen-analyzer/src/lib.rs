//! Model analyzer for the neural code generator.
//!
//! Takes classified neuron/synapse declarations and produces frozen
//! descriptions with translated update snippets: special-term substitution,
//! ODE recognition, per-method discretization, coupled implicit/midpoint
//! solving, bounds clamps, and dependency sets. The symbolic layer is a small
//! in-crate AST; no external CAS is involved.

#![deny(missing_docs)]

pub mod coupled;
pub mod error;
pub mod expr;
pub mod functions;
pub mod neuron;
pub mod synapse;
pub mod translate;

pub use coupled::{solve_coupled, CoupledVariable, MAX_COUPLED};
pub use error::{AnalyzerError, Result};
pub use functions::parse_functions;
pub use neuron::{analyse_neuron, NeuronModel};
pub use synapse::{analyse_synapse, SynapseModel};
pub use translate::{
    find_sums, rebind_placeholders, Translated, Translator, GLOBAL_INDEX, LOCAL_INDEX,
    POST_INDEX, PRE_INDEX,
};
