//! Nestlings - spatial nest search and raising simulation
//!
//! Individuals split a fixed energy budget between searching and raising at
//! fixed nest sites. Each round they decide from beliefs, act in shuffled
//! order against a shared resource field, and learn from what they saw.

pub mod core;
pub mod entity;
pub mod simulation;
pub mod world;

pub use crate::core::config::SimulationConfig;
pub use crate::core::error::{Result, SimError};
pub use crate::simulation::output::{RoundReport, SimulationOutput};
pub use crate::simulation::round::Simulation;
