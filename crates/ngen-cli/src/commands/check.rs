//! `ngen check`: analyse every declared model and print a summary

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use ngen_model::{Description, Kind};

use crate::error::CliResult;
use crate::model_file::ModelFile;

/// Analyse a model file without emitting anything
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Model file (.toml)
    pub model: PathBuf,
}

impl CheckCommand {
    /// Run the analysis and print one block per description
    pub fn execute(self) -> CliResult<()> {
        let file = ModelFile::load(&self.model)?;
        let config = file.config(false);
        let registry = file.analyse(&config)?;

        for desc in registry.descriptions() {
            print_description(desc);
        }
        println!(
            "{} population(s), {} projection(s)",
            registry.populations().len(),
            registry.projections().len()
        );
        info!("analysis passed");
        Ok(())
    }
}

fn print_description(desc: &Description) {
    println!("{} '{}' ({}-coded)", desc.object, desc.name, desc.model_type);
    for attr in desc.parameters.iter().chain(desc.variables.iter()) {
        let role = match attr.kind {
            Kind::Parameter => "parameter",
            Kind::Variable => "variable ",
        };
        let locality = match attr.locality {
            ngen_model::Locality::Local => "local ",
            ngen_model::Locality::Global => "global",
        };
        let method = attr
            .equation
            .as_ref()
            .map(|_| format!(" [{}]", attr.method.name()))
            .unwrap_or_default();
        println!(
            "  {} {} {} {} = {}{}",
            role,
            locality,
            attr.ctype.name(),
            attr.name,
            attr.init.to_code(),
            method
        );
    }
    if !desc.targets.is_empty() {
        println!("  targets: {}", desc.targets.join(", "));
    }
    if !desc.global_operations.is_empty() {
        let ops: Vec<String> = desc
            .global_operations
            .iter()
            .map(|op| format!("{}({})", op.op.name(), op.var))
            .collect();
        println!("  reductions: {}", ops.join(", "));
    }
    if let Some(spike) = &desc.spike {
        println!("  spike: {}", spike.spike_cond);
        println!("  reset statements: {}", spike.spike_reset.len());
    }
    if let Some(refractory) = &desc.refractory {
        println!("  refractory: {}", refractory);
    }
}
