//! # ngen CLI - neural model analyzer and code generator
//!
//! Parses symbolic neuron/synapse model files, analyses their equations and
//! emits native source units for the chosen backend.

use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod error;
mod model_file;

use commands::NgenCli;

fn main() {
    let cli = NgenCli::parse();

    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    if let Err(err) = cli.execute() {
        error!("Command failed: {}", err);
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
