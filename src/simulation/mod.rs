//! Decision and settlement engine

pub mod allocation;
pub mod belief;
pub mod bootstrap;
pub mod output;
pub mod round;
pub mod settlement;
pub mod snapshot;
pub mod strategy;

pub use allocation::{allocate, AllocationParams};
pub use belief::{BeliefStore, ClassShare, SearchObservation};
pub use bootstrap::bootstrap;
pub use output::{IndividualReport, MatingSystemStats, RoundReport, SimulationOutput, SiteReport};
pub use round::Simulation;
pub use snapshot::RoundSnapshot;
pub use strategy::{
    ContributorStrategy, Decision, DecisionContext, FixedStrategy, OwnerStrategy, Strategy,
};
