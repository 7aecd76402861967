//! CLI command implementations for ngen

use clap::{Parser, Subcommand};

use crate::error::CliResult;

pub mod check;
pub mod generate;
pub mod ops;

/// ngen - analyzer and code generator for neural simulation models
#[derive(Parser, Debug)]
#[command(
    name = "ngen",
    version,
    about = "Analyzer and code generator for neuron/synapse models",
    long_about = "ngen parses symbolic neuron and synapse declarations, analyses their \
                  equations, and emits per-population and per-projection native source \
                  units for a chosen backend."
)]
pub struct NgenCli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyse a model file and report every description
    Check(check::CheckCommand),

    /// Analyse a model file and emit the source tree
    #[command(alias = "gen")]
    Generate(generate::GenerateCommand),

    /// List recognized flags, methods, distributions and operations
    Ops(ops::OpsCommand),
}

impl NgenCli {
    /// Execute the CLI command
    pub fn execute(self) -> CliResult<()> {
        match self.command {
            Commands::Check(cmd) => cmd.execute(),
            Commands::Generate(cmd) => cmd.execute(),
            Commands::Ops(cmd) => cmd.execute(),
        }
    }
}
