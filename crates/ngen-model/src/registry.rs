//! Registry of finished descriptions and network instances.
//!
//! The registry is an owned value threaded explicitly through the generator
//! call; artifact ids (`Population0`, `Projection1`, ...) are assigned in
//! registration order.

use crate::description::{Description, ObjectKind};

/// A population instance over a neuron description
#[derive(Debug, Clone)]
pub struct PopulationInstance {
    /// Artifact id
    pub id: usize,
    /// User-facing population name
    pub name: String,
    /// Number of units
    pub size: usize,
    /// Name of the neuron description
    pub neuron: String,
    /// Largest outgoing axonal delay, in steps
    pub max_delay_steps: usize,
}

/// A projection instance between two populations
#[derive(Debug, Clone)]
pub struct ProjectionInstance {
    /// Artifact id
    pub id: usize,
    /// Pre-synaptic population name
    pub pre: String,
    /// Post-synaptic population name
    pub post: String,
    /// Target channel fed by this projection
    pub target: String,
    /// Name of the synapse description, if any
    pub synapse: Option<String>,
}

/// Process-wide list of declared types and instances
#[derive(Debug, Default)]
pub struct Registry {
    descriptions: Vec<Description>,
    populations: Vec<PopulationInstance>,
    projections: Vec<ProjectionInstance>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished description; returns its index
    pub fn add_description(&mut self, desc: Description) -> usize {
        self.descriptions.push(desc);
        self.descriptions.len() - 1
    }

    /// Register a population over a neuron description; returns its artifact id
    pub fn add_population(
        &mut self,
        name: impl Into<String>,
        size: usize,
        neuron: impl Into<String>,
    ) -> usize {
        let id = self.populations.len();
        self.populations.push(PopulationInstance {
            id,
            name: name.into(),
            size,
            neuron: neuron.into(),
            max_delay_steps: 0,
        });
        id
    }

    /// Register a projection; returns its artifact id
    pub fn add_projection(
        &mut self,
        pre: impl Into<String>,
        post: impl Into<String>,
        target: impl Into<String>,
        synapse: Option<String>,
    ) -> usize {
        let id = self.projections.len();
        self.projections.push(ProjectionInstance {
            id,
            pre: pre.into(),
            post: post.into(),
            target: target.into(),
            synapse,
        });
        id
    }

    /// Look up a description by model name and object kind
    pub fn description(&self, name: &str, object: ObjectKind) -> Option<&Description> {
        self.descriptions
            .iter()
            .find(|d| d.name == name && d.object == object)
    }

    /// All registered descriptions, in registration order
    pub fn descriptions(&self) -> &[Description] {
        &self.descriptions
    }

    /// All registered populations
    pub fn populations(&self) -> &[PopulationInstance] {
        &self.populations
    }

    /// Mutable population access, used to raise delay bounds during wiring
    pub fn population_mut(&mut self, id: usize) -> Option<&mut PopulationInstance> {
        self.populations.get_mut(id)
    }

    /// All registered projections
    pub fn projections(&self) -> &[ProjectionInstance] {
        &self.projections
    }
}

/// Generator-wide configuration shared by the analyzer and the emitter
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Integration step, in milliseconds
    pub dt: f64,
    /// Worker threads for the parallel backend
    pub num_threads: usize,
    /// Enable structural-plasticity clauses and runtime accessors
    pub structural_plasticity: bool,
    /// Wrap emitted step sections with measurement markers
    pub profiling: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            dt: 1.0,
            num_threads: 1,
            structural_plasticity: false,
            profiling: false,
        }
    }
}
