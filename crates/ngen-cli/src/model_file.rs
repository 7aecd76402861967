//! TOML model files: network configuration, neuron/synapse declarations,
//! population and projection instances.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use ngen_analyzer::{analyse_neuron, analyse_synapse, NeuronModel, SynapseModel};
use ngen_model::{GeneratorConfig, ModelType, ObjectKind, Registry};

use crate::error::{CliError, CliResult};

/// Parsed model file
#[derive(Debug, Deserialize)]
pub struct ModelFile {
    /// `[network]` section
    #[serde(default)]
    pub network: NetworkSection,
    /// `[neuron.<name>]` declarations
    #[serde(default)]
    pub neuron: BTreeMap<String, NeuronSection>,
    /// `[synapse.<name>]` declarations
    #[serde(default)]
    pub synapse: BTreeMap<String, SynapseSection>,
    /// `[[population]]` instances
    #[serde(default, rename = "population")]
    pub populations: Vec<PopulationSection>,
    /// `[[projection]]` instances
    #[serde(default, rename = "projection")]
    pub projections: Vec<ProjectionSection>,
}

/// `[network]` settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Integration step in milliseconds
    pub dt: f64,
    /// Worker threads for the parallel backend
    pub num_threads: usize,
    /// Enable structural plasticity
    pub structural_plasticity: bool,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            dt: 1.0,
            num_threads: 1,
            structural_plasticity: false,
        }
    }
}

/// One neuron model declaration
#[derive(Debug, Deserialize)]
pub struct NeuronSection {
    /// `rate` or `spike`
    #[serde(rename = "type")]
    pub model_type: String,
    /// Parameter block
    #[serde(default)]
    pub parameters: String,
    /// Equation block
    #[serde(default)]
    pub equations: String,
    /// Function block
    pub functions: Option<String>,
    /// Spike condition
    pub spike: Option<String>,
    /// Reset block
    pub reset: Option<String>,
    /// Refractory period
    pub refractory: Option<String>,
}

/// One synapse model declaration
#[derive(Debug, Deserialize)]
pub struct SynapseSection {
    /// `rate` or `spike`
    #[serde(rename = "type")]
    pub model_type: String,
    /// Parameter block
    #[serde(default)]
    pub parameters: String,
    /// Equation block
    #[serde(default)]
    pub equations: String,
    /// Function block
    pub functions: Option<String>,
    /// Continuous transmission override
    pub psp: Option<String>,
    /// Post-synaptic operation
    #[serde(default = "default_operation")]
    pub operation: String,
    /// Pre-synaptic event block
    pub pre_spike: Option<String>,
    /// Post-synaptic event block
    pub post_spike: Option<String>,
    /// Pruning condition
    pub pruning: Option<String>,
    /// Creating condition
    pub creating: Option<String>,
}

fn default_operation() -> String {
    "sum".to_string()
}

/// One population instance
#[derive(Debug, Deserialize)]
pub struct PopulationSection {
    /// Population name
    pub name: String,
    /// Number of units
    pub size: usize,
    /// Neuron model name
    pub neuron: String,
    /// Largest outgoing delay, in steps
    #[serde(default)]
    pub max_delay_steps: usize,
}

/// One projection instance
#[derive(Debug, Deserialize)]
pub struct ProjectionSection {
    /// Pre-synaptic population
    pub pre: String,
    /// Post-synaptic population
    pub post: String,
    /// Target channel
    pub target: String,
    /// Synapse model name (plain weighted synapse when omitted)
    pub synapse: Option<String>,
}

impl ModelFile {
    /// Load and parse a model file
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Generator configuration from the `[network]` section
    pub fn config(&self, profiling: bool) -> GeneratorConfig {
        GeneratorConfig {
            dt: self.network.dt,
            num_threads: self.network.num_threads,
            structural_plasticity: self.network.structural_plasticity,
            profiling,
        }
    }

    /// Analyse every declared model and register the instances
    pub fn analyse(&self, config: &GeneratorConfig) -> CliResult<Registry> {
        let mut registry = Registry::new();

        for (name, section) in &self.neuron {
            let model = NeuronModel {
                name: name.clone(),
                model_type: parse_model_type(&section.model_type, name)?,
                parameters: section.parameters.clone(),
                equations: section.equations.clone(),
                functions: section.functions.clone(),
                spike: section.spike.clone(),
                reset: section.reset.clone(),
                refractory: section.refractory.clone(),
                extra_values: BTreeMap::new(),
            };
            let desc = analyse_neuron(&model, config)?;
            registry.add_description(desc);
        }

        for (name, section) in &self.synapse {
            let model = SynapseModel {
                name: name.clone(),
                model_type: parse_model_type(&section.model_type, name)?,
                parameters: section.parameters.clone(),
                equations: section.equations.clone(),
                functions: section.functions.clone(),
                psp: section.psp.clone(),
                operation: section.operation.clone(),
                pre_spike: section.pre_spike.clone(),
                post_spike: section.post_spike.clone(),
                pruning: section.pruning.clone(),
                creating: section.creating.clone(),
                extra_values: BTreeMap::new(),
            };
            let desc = analyse_synapse(&model, config)?;
            registry.add_description(desc);
        }

        for pop in &self.populations {
            if registry.description(&pop.neuron, ObjectKind::Neuron).is_none() {
                return Err(CliError::invalid_args(format!(
                    "population '{}' references unknown neuron model '{}'",
                    pop.name, pop.neuron
                )));
            }
            let id = registry.add_population(&pop.name, pop.size, &pop.neuron);
            if pop.max_delay_steps > 0 {
                if let Some(p) = registry.population_mut(id) {
                    p.max_delay_steps = pop.max_delay_steps;
                }
            }
        }

        for proj in &self.projections {
            for pop_name in [&proj.pre, &proj.post] {
                if !self.populations.iter().any(|p| &p.name == pop_name) {
                    return Err(CliError::invalid_args(format!(
                        "projection references unknown population '{}'",
                        pop_name
                    )));
                }
            }
            if let Some(synapse) = &proj.synapse {
                if registry.description(synapse, ObjectKind::Synapse).is_none() {
                    return Err(CliError::invalid_args(format!(
                        "projection references unknown synapse model '{}'",
                        synapse
                    )));
                }
            }
            registry.add_projection(&proj.pre, &proj.post, &proj.target, proj.synapse.clone());
        }

        Ok(registry)
    }
}

fn parse_model_type(text: &str, model: &str) -> CliResult<ModelType> {
    match text {
        "rate" => Ok(ModelType::Rate),
        "spike" | "spiking" => Ok(ModelType::Spike),
        other => Err(CliError::invalid_args(format!(
            "model '{}' has unknown type '{}' (expected 'rate' or 'spike')",
            model, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
[network]
dt = 0.5

[neuron.leaky]
type = "rate"
parameters = """
tau = 10.0 : population
baseline = 0.0
"""
equations = "tau * dr/dt + r = baseline : min=0.0"

[[population]]
name = "Exc"
size = 100
neuron = "leaky"

[[projection]]
pre = "Exc"
post = "Exc"
target = "exc"
"#;

    #[test]
    fn parse_and_analyse_example() {
        let file: ModelFile = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(file.network.dt, 0.5);
        let config = file.config(false);
        let registry = file.analyse(&config).unwrap();
        assert_eq!(registry.populations().len(), 1);
        assert_eq!(registry.projections().len(), 1);
        assert!(registry.description("leaky", ObjectKind::Neuron).is_some());
    }

    #[test]
    fn unknown_neuron_reference_fails() {
        let text = r#"
[[population]]
name = "Exc"
size = 10
neuron = "missing"
"#;
        let file: ModelFile = toml::from_str(text).unwrap();
        let err = file.analyse(&file.config(false)).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgs(_)));
    }
}
