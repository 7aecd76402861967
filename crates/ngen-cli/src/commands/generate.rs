//! `ngen generate`: analyse a model file and emit the source tree

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use ngen_codegen::{emit_network, write_tree, Backend};

use crate::error::{CliError, CliResult};
use crate::model_file::ModelFile;

/// Emit the full source tree for a model file
#[derive(Args, Debug)]
pub struct GenerateCommand {
    /// Model file (.toml)
    pub model: PathBuf,

    /// Output directory for the generated tree
    #[arg(short, long, default_value = "generated")]
    pub out: PathBuf,

    /// Target backend: single-threaded, parallel-threads or gpu
    #[arg(short, long, default_value = "single-threaded")]
    pub backend: String,

    /// Wrap emitted step sections with measurement markers
    #[arg(long)]
    pub profile: bool,
}

impl GenerateCommand {
    /// Analyse, emit and write the tree
    pub fn execute(self) -> CliResult<()> {
        let backend = Backend::from_name(&self.backend).ok_or_else(|| {
            CliError::invalid_args(format!("unknown backend '{}'", self.backend))
        })?;

        let file = ModelFile::load(&self.model)?;
        let config = file.config(self.profile);
        let registry = file.analyse(&config)?;

        let artifacts = emit_network(&registry, &config, backend)?;
        write_tree(&self.out, &artifacts)?;

        for artifact in &artifacts {
            println!("  {}", artifact.name);
        }
        println!("wrote {} file(s) to {}", artifacts.len(), self.out.display());
        info!(backend = %backend, "generation finished");
        Ok(())
    }
}
