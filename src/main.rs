//! Nestlings - command line driver
//!
//! Loads a complete TOML configuration, runs the simulation and prints a
//! summary; the full per-round record can be written as JSON.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nestlings::core::config::SimulationConfig;
use nestlings::core::error::Result;
use nestlings::Simulation;

/// Nest search and raising simulation
#[derive(Parser, Debug)]
#[command(name = "nestlings")]
#[command(about = "Agent-based simulation of search versus nest-raising investment")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a simulation from a configuration file
    Run {
        /// TOML configuration; every parameter must be present
        #[arg(long)]
        config: PathBuf,

        /// Override `run.rounds`
        #[arg(long)]
        rounds: Option<u32>,

        /// Override `run.seed`
        #[arg(long)]
        seed: Option<u64>,

        /// Write the per-round reports as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the placeholder configuration as TOML
    DefaultConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nestlings=info".into()),
        )
        .init();

    match Cli::parse().command {
        Command::Run {
            config,
            rounds,
            seed,
            output,
        } => {
            let mut config = SimulationConfig::load(&config)?;
            if let Some(rounds) = rounds {
                config.run.rounds = rounds;
            }
            if let Some(seed) = seed {
                config.run.seed = seed;
            }

            tracing::info!(
                grid = config.world.grid_size,
                primaries = config.population.primary_count,
                secondaries = config.population.secondary_count,
                rounds = config.run.rounds,
                seed = config.run.seed,
                "starting simulation"
            );

            let rounds = config.run.rounds;
            let mut sim = Simulation::new(config)?;
            let result = sim.run(rounds)?;

            println!("{}", result.summary());
            if let Some(path) = output {
                std::fs::write(&path, result.to_json())?;
                println!("Full output written to {}", path.display());
            }
        }
        Command::DefaultConfig => {
            print!("{}", SimulationConfig::default().to_toml_string()?);
        }
    }
    Ok(())
}
