//! The canonical description record for a neuron or synapse type

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use crate::attribute::{Attribute, DistributionKind, Locality};

/// Neuron or synapse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Population-level model
    Neuron,
    /// Projection-level model
    Synapse,
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Neuron => write!(f, "neuron"),
            ObjectKind::Synapse => write!(f, "synapse"),
        }
    }
}

/// Rate-coded or spiking semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Continuous firing rate, output variable `r`
    Rate,
    /// Event-based spikes with condition/reset/refractory
    Spike,
}

impl Display for ModelType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::Rate => write!(f, "rate"),
            ModelType::Spike => write!(f, "spike"),
        }
    }
}

/// Post-synaptic accumulation applied over a dendrite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PsOperation {
    /// Sum of weighted inputs (the only legal choice for spiking synapses)
    #[default]
    Sum,
    /// Minimum over the dendrite
    Min,
    /// Maximum over the dendrite
    Max,
    /// Mean over the dendrite
    Mean,
}

impl PsOperation {
    /// Declaration-surface name
    pub fn name(self) -> &'static str {
        match self {
            PsOperation::Sum => "sum",
            PsOperation::Min => "min",
            PsOperation::Max => "max",
            PsOperation::Mean => "mean",
        }
    }

    /// Resolve from the declaration surface
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(PsOperation::Sum),
            "min" => Some(PsOperation::Min),
            "max" => Some(PsOperation::Max),
            "mean" => Some(PsOperation::Mean),
            _ => None,
        }
    }
}

/// A per-step reduction over a local variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GlobalOp {
    /// Minimum over the group
    Min,
    /// Maximum over the group
    Max,
    /// Mean over the group
    Mean,
    /// L1 norm over the group
    Norm1,
    /// L2 norm over the group
    Norm2,
}

impl GlobalOp {
    /// Declaration-surface name
    pub fn name(self) -> &'static str {
        match self {
            GlobalOp::Min => "min",
            GlobalOp::Max => "max",
            GlobalOp::Mean => "mean",
            GlobalOp::Norm1 => "norm1",
            GlobalOp::Norm2 => "norm2",
        }
    }

    /// Resolve from the declaration surface
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(GlobalOp::Min),
            "max" => Some(GlobalOp::Max),
            "mean" => Some(GlobalOp::Mean),
            "norm1" => Some(GlobalOp::Norm1),
            "norm2" => Some(GlobalOp::Norm2),
            _ => None,
        }
    }
}

/// One `(op, var)` reduction required by the equations
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GlobalOperation {
    /// Reduction kind
    pub op: GlobalOp,
    /// Local variable being reduced
    pub var: String,
}

/// A per-step random draw referenced from an equation
#[derive(Debug, Clone, PartialEq)]
pub struct RandomDraw {
    /// Generated buffer name (`rand_0`, `rand_1`, ...)
    pub name: String,
    /// Distribution kind
    pub dist: DistributionKind,
    /// Literal distribution arguments
    pub args: Vec<f64>,
    /// Locality of the buffer (follows the consuming variable)
    pub locality: Locality,
}

/// A user-defined pure scalar function
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Argument names
    pub args: Vec<String>,
    /// Body in the target dialect
    pub body: String,
}

/// One reset-style assignment (spike reset, pre_spike, post_spike)
#[derive(Debug, Clone, PartialEq)]
pub struct ResetStatement {
    /// Assigned variable
    pub name: String,
    /// Original statement text
    pub eq: String,
    /// Emitted snippet
    pub cpp: String,
    /// Either empty or `unless_refractory`
    pub constraint: String,
    /// Attributes read by the statement
    pub dependencies: BTreeSet<String>,
}

/// Spike condition and reset block of a spiking model
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeBlock {
    /// Emitted boolean condition
    pub spike_cond: String,
    /// Attributes read by the condition
    pub spike_cond_dependencies: BTreeSet<String>,
    /// Reset statements run for units that fired
    pub spike_reset: Vec<ResetStatement>,
}

/// An analyzed side expression (psp override, pruning/creating condition)
#[derive(Debug, Clone, PartialEq)]
pub struct CodeExpression {
    /// Original text
    pub eq: String,
    /// Emitted snippet
    pub cpp: String,
    /// Attributes read by the expression
    pub dependencies: BTreeSet<String>,
}

/// The frozen top-level record consumed by the emitter
#[derive(Debug, Clone)]
pub struct Description {
    /// Model name as declared
    pub name: String,
    /// Neuron or synapse
    pub object: ObjectKind,
    /// Rate or spike
    pub model_type: ModelType,
    /// Ordered parameter attributes
    pub parameters: Vec<Attribute>,
    /// Ordered variable attributes
    pub variables: Vec<Attribute>,
    /// User-defined functions
    pub functions: Vec<Function>,
    /// All attribute names, in declaration order
    pub attributes: Vec<String>,
    /// Names of local attributes
    pub local: Vec<String>,
    /// Names of global attributes
    pub global: Vec<String>,
    /// Synaptic targets referenced by `sum(t)`
    pub targets: Vec<String>,
    /// Per-step random draws
    pub random_distributions: Vec<RandomDraw>,
    /// Per-step reductions
    pub global_operations: Vec<GlobalOperation>,
    /// Spike condition and reset (spiking models only)
    pub spike: Option<SpikeBlock>,
    /// Refractory period: literal or expression text
    pub refractory: Option<String>,
    /// Post-synaptic accumulation (synapses only)
    pub operation: PsOperation,
    /// Continuous transmission override (synapses only)
    pub psp: Option<CodeExpression>,
    /// Statements run on a pre-synaptic spike (spiking synapses)
    pub pre_spike: Vec<ResetStatement>,
    /// Statements run on a post-synaptic spike (spiking synapses)
    pub post_spike: Vec<ResetStatement>,
    /// Structural-plasticity pruning condition
    pub pruning: Option<CodeExpression>,
    /// Structural-plasticity creation condition
    pub creating: Option<CodeExpression>,
}

impl Description {
    /// Empty description shell for a model
    pub fn new(name: impl Into<String>, object: ObjectKind, model_type: ModelType) -> Self {
        Self {
            name: name.into(),
            object,
            model_type,
            parameters: Vec::new(),
            variables: Vec::new(),
            functions: Vec::new(),
            attributes: Vec::new(),
            local: Vec::new(),
            global: Vec::new(),
            targets: Vec::new(),
            random_distributions: Vec::new(),
            global_operations: Vec::new(),
            spike: None,
            refractory: None,
            operation: PsOperation::Sum,
            psp: None,
            pre_spike: Vec::new(),
            post_spike: Vec::new(),
            pruning: None,
            creating: None,
        }
    }

    /// Reverse lookup of an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.parameters
            .iter()
            .chain(self.variables.iter())
            .find(|a| a.name == name)
    }

    /// True if `name` is a declared attribute
    pub fn is_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    /// True if `name` is a local attribute
    pub fn is_local(&self, name: &str) -> bool {
        self.local.iter().any(|a| a == name)
    }

    /// True if `name` is a global attribute
    pub fn is_global(&self, name: &str) -> bool {
        self.global.iter().any(|a| a == name)
    }

    /// Recompute the attribute/local/global name partitions from the current
    /// parameter and variable lists.
    pub fn rebuild_partitions(&mut self) {
        self.attributes.clear();
        self.local.clear();
        self.global.clear();
        for attr in self.parameters.iter().chain(self.variables.iter()) {
            self.attributes.push(attr.name.clone());
            match attr.locality {
                Locality::Local => self.local.push(attr.name.clone()),
                Locality::Global => self.global.push(attr.name.clone()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Bounds, CType, Init, Kind, Method};

    fn attr(name: &str, kind: Kind, locality: Locality) -> Attribute {
        Attribute {
            name: name.into(),
            kind,
            locality,
            ctype: CType::Double,
            init: Init::Double(0.0),
            bounds: Bounds::default(),
            flags: Vec::new(),
            eq: String::new(),
            method: Method::Explicit,
            equation: None,
        }
    }

    #[test]
    fn partitions_cover_every_attribute_once() {
        let mut desc = Description::new("lif", ObjectKind::Neuron, ModelType::Rate);
        desc.parameters.push(attr("tau", Kind::Parameter, Locality::Global));
        desc.variables.push(attr("r", Kind::Variable, Locality::Local));
        desc.rebuild_partitions();

        assert_eq!(desc.attributes, vec!["tau", "r"]);
        for name in &desc.attributes {
            assert!(desc.is_local(name) ^ desc.is_global(name));
        }
    }

    #[test]
    fn reverse_lookup_finds_variables() {
        let mut desc = Description::new("lif", ObjectKind::Neuron, ModelType::Rate);
        desc.variables.push(attr("r", Kind::Variable, Locality::Local));
        desc.rebuild_partitions();
        assert!(desc.attribute("r").is_some());
        assert!(desc.attribute("missing").is_none());
    }
}
