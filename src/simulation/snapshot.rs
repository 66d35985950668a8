//! Read-only view of the world handed to every strategy in the Decide phase

use crate::core::error::{Result, SimError};
use crate::core::types::{AgentId, GridPos, Round, SiteId};
use crate::world::environment::Environment;
use crate::world::field::{FieldSummary, ResourceField};
use crate::world::site::SiteSnapshot;

/// Everything a decision may look at, frozen at the start of a round
///
/// Strategies close their payoff functions over this, never over the live
/// environment, so the Act phase can mutate freely.
#[derive(Debug, Clone)]
pub struct RoundSnapshot {
    pub round: Round,
    pub field: ResourceField,
    /// Summary of `field`, carried into the round report
    pub field_summary: FieldSummary,
    /// Individual positions, indexed by `AgentId`
    pub positions: Vec<GridPos>,
    /// Site compositions, indexed by `SiteId`
    pub sites: Vec<SiteSnapshot>,
    pub nest_locations: Vec<GridPos>,
}

impl RoundSnapshot {
    pub fn capture(round: Round, env: &Environment) -> Self {
        Self {
            round,
            field: env.field().clone(),
            field_summary: env.field_summary(),
            positions: env.individuals().iter().map(|ind| ind.position).collect(),
            sites: env.sites().iter().map(|site| site.snapshot()).collect(),
            nest_locations: env.nest_locations().to_vec(),
        }
    }

    pub fn position(&self, agent: AgentId) -> Result<GridPos> {
        self.positions
            .get(agent.index())
            .copied()
            .ok_or(SimError::UnknownAgent(agent))
    }

    pub fn site(&self, id: SiteId) -> Result<&SiteSnapshot> {
        self.sites.get(id.index()).ok_or(SimError::UnknownSite(id))
    }

    /// Sites whose nest lies within `radius` of `pos`, ascending by id
    pub fn sites_within(&self, pos: GridPos, radius: f64) -> Vec<SiteId> {
        self.nest_locations
            .iter()
            .enumerate()
            .filter(|(_, nest)| nest.distance(&pos) <= radius)
            .map(|(i, _)| SiteId(i as u32))
            .collect()
    }

    /// Closest nest to `pos`; ties go to the lower id
    pub fn nearest_site(&self, pos: GridPos) -> Option<SiteId> {
        self.nest_locations
            .iter()
            .enumerate()
            .map(|(i, nest)| (i, nest.distance(&pos)))
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, bd)) if bd <= d => best,
                _ => Some((i, d)),
            })
            .map(|(i, _)| SiteId(i as u32))
    }
}
