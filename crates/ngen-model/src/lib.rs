//! Declaration model for the neural code generator.
//!
//! This crate owns the front half of the analysis pipeline: the lexical
//! extractor that splits declaration blocks into `lhs = rhs : flags` records,
//! the attribute classifier that assigns kind/locality/ctype/init/bounds, and
//! the description record that the analyzer fills and the emitter consumes.

#![warn(missing_docs)]

pub mod attribute;
pub mod classify;
pub mod description;
pub mod error;
pub mod extract;
pub mod registry;

pub use attribute::{
    Attribute, Bounds, CType, DistributionKind, Equation, Init, Kind, Locality, Method, RandomRef,
};
pub use classify::{classify_parameters, classify_variables, find_derivative, variable_name};
pub use description::{
    CodeExpression, Description, Function, GlobalOp, GlobalOperation, ModelType, ObjectKind,
    PsOperation, RandomDraw, ResetStatement, SpikeBlock,
};
pub use error::{ModelError, Result};
pub use extract::{extract_declarations, split_top_level, DeclMode, Declaration, FlagToken};
pub use registry::{GeneratorConfig, PopulationInstance, ProjectionInstance, Registry};
