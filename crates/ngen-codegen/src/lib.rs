//! Template emitter for the neural code generator.
//!
//! Consumes frozen descriptions and a backend tag and renders the on-disk
//! source tree: per-population and per-projection headers, implementation
//! units, C binding surfaces, a generated Makefile and a JSON manifest.
//! Artifacts carry no timestamps, so re-emitting the same descriptions
//! yields byte-identical trees.

#![warn(missing_docs)]

use std::path::Path;

use tracing::info;

use ngen_analyzer::{analyse_synapse, SynapseModel};
use ngen_model::{Description, GeneratorConfig, ModelType, ObjectKind, Registry};

pub mod backend;
pub mod error;
pub mod manifest;
pub mod order;
pub mod population;
pub mod profile;
pub mod projection;
pub mod render;
pub mod templates;

pub use backend::Backend;
pub use error::{EmitError, Result};
pub use manifest::{Manifest, ManifestEntry};
pub use population::emit_population;
pub use profile::ProfileAnnotator;
pub use projection::emit_projection;

/// One generated file
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// File name inside the generated tree
    pub name: String,
    /// Full text contents
    pub contents: String,
}

/// Emit the whole source tree for a registry of populations and projections
pub fn emit_network(
    registry: &Registry,
    config: &GeneratorConfig,
    backend: Backend,
) -> Result<Vec<Artifact>> {
    let mut profiler = ProfileAnnotator::new(config.profiling, backend);
    let mut artifacts = Vec::new();
    let mut manifest = Manifest::new(backend);

    for pop in registry.populations() {
        let desc = registry
            .description(&pop.neuron, ObjectKind::Neuron)
            .ok_or_else(|| {
                EmitError::bug("network", format!("unknown neuron model '{}'", pop.neuron))
            })?;
        let units = emit_population(pop, desc, config, backend, &mut profiler)?;
        record_units(&mut manifest, &units);
        artifacts.extend(units);
    }

    for proj in registry.projections() {
        let post_type = registry
            .populations()
            .iter()
            .find(|p| p.name == proj.post)
            .and_then(|p| registry.description(&p.neuron, ObjectKind::Neuron))
            .map(|d| d.model_type)
            .unwrap_or(ModelType::Rate);
        let units = match &proj.synapse {
            Some(name) => {
                let desc = registry
                    .description(name, ObjectKind::Synapse)
                    .ok_or_else(|| {
                        EmitError::bug("network", format!("unknown synapse model '{}'", name))
                    })?;
                emit_projection(proj, desc, config, backend, &mut profiler)?
            }
            None => {
                let desc = default_synapse(post_type, config)?;
                emit_projection(proj, &desc, config, backend, &mut profiler)?
            }
        };
        record_units(&mut manifest, &units);
        artifacts.extend(units);
    }

    if profiler.enabled() {
        let support = profiler.support_header();
        manifest.push("Profiling.h", "support");
        artifacts.push(Artifact {
            name: "Profiling.h".to_string(),
            contents: support,
        });
        manifest.profile_regions = profiler.regions().to_vec();
    }

    manifest.push("Makefile", "build");
    artifacts.push(Artifact {
        name: "Makefile".to_string(),
        contents: manifest.makefile(backend),
    });
    artifacts.push(Artifact {
        name: "manifest.json".to_string(),
        contents: manifest.to_json(),
    });

    info!(
        populations = registry.populations().len(),
        projections = registry.projections().len(),
        backend = %backend,
        files = artifacts.len(),
        "emitted source tree"
    );
    Ok(artifacts)
}

/// Plain weighted synapse used by projections without an explicit model
fn default_synapse(model_type: ModelType, config: &GeneratorConfig) -> Result<Description> {
    let model = match model_type {
        ModelType::Rate => SynapseModel::rate("default", "w = 0.0", ""),
        ModelType::Spike => SynapseModel::spiking("default", "w = 0.0", ""),
    };
    analyse_synapse(&model, config)
        .map_err(|e| EmitError::bug("network", format!("default synapse: {}", e)))
}

fn record_units(manifest: &mut Manifest, units: &[Artifact]) {
    for unit in units {
        let role = if unit.name.ends_with(".h") {
            "header"
        } else if unit.name.ends_with("_api.cpp") {
            "binding"
        } else {
            "source"
        };
        manifest.push(unit.name.clone(), role);
    }
}

/// Write a generated tree to disk. Partial trees left by an interrupted run
/// are the caller's responsibility; the generator keeps no durable state.
pub fn write_tree(dir: &Path, artifacts: &[Artifact]) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for artifact in artifacts {
        std::fs::write(dir.join(&artifact.name), &artifact.contents)?;
    }
    Ok(())
}
