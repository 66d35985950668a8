//! Sites (nests): fixed-position investment targets

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{AgentId, GridPos, SiteId};

/// A nest owned by at most one primary and tended by any number of
/// secondaries
///
/// Contributors are exactly the keys of the share map, so the contributor
/// set and the share map can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub position: GridPos,
    pub owner: Option<AgentId>,
    owner_share: f64,
    contributor_shares: BTreeMap<AgentId, f64>,
    /// Resources extracted for this site in the current round
    accumulated_resources: f64,
    /// Offspring computed at the last settlement
    pub expected_offspring: f64,
}

impl Site {
    pub fn new(id: SiteId, owner: Option<AgentId>, position: GridPos) -> Self {
        Self {
            id,
            position,
            owner,
            owner_share: 0.0,
            contributor_shares: BTreeMap::new(),
            accumulated_resources: 0.0,
            expected_offspring: 0.0,
        }
    }

    pub fn owner_share(&self) -> f64 {
        self.owner_share
    }

    pub fn set_owner_share(&mut self, share: f64) {
        self.owner_share = share.max(0.0);
    }

    /// Record a secondary's share; a zero share removes the contributor
    pub fn set_contributor_share(&mut self, agent: AgentId, share: f64) {
        if share > 0.0 {
            self.contributor_shares.insert(agent, share);
        } else {
            self.contributor_shares.remove(&agent);
        }
    }

    /// Drop every share ahead of a fresh commit
    pub fn clear_investments(&mut self) {
        self.owner_share = 0.0;
        self.contributor_shares.clear();
    }

    pub fn contributor_share(&self, agent: AgentId) -> f64 {
        self.contributor_shares.get(&agent).copied().unwrap_or(0.0)
    }

    pub fn contributors(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.contributor_shares.keys().copied()
    }

    pub fn contributor_count(&self) -> usize {
        self.contributor_shares.len()
    }

    pub fn contributor_shares(&self) -> &BTreeMap<AgentId, f64> {
        &self.contributor_shares
    }

    /// Share of `agent` at this site, whether as owner or contributor
    pub fn share_of(&self, agent: AgentId) -> f64 {
        if self.owner == Some(agent) {
            self.owner_share
        } else {
            self.contributor_share(agent)
        }
    }

    pub fn total_contributor_share(&self) -> f64 {
        self.contributor_shares.values().sum()
    }

    pub fn total_investment(&self) -> f64 {
        self.owner_share + self.total_contributor_share()
    }

    /// No one invests here this round
    pub fn is_vacant(&self) -> bool {
        self.total_investment() <= 0.0
    }

    pub fn accumulated_resources(&self) -> f64 {
        self.accumulated_resources
    }

    pub fn add_resources(&mut self, amount: f64) {
        self.accumulated_resources += amount;
    }

    pub fn reset_resources(&mut self) {
        self.accumulated_resources = 0.0;
    }

    pub fn snapshot(&self) -> SiteSnapshot {
        SiteSnapshot {
            id: self.id,
            position: self.position,
            owner: self.owner,
            owner_share: self.owner_share,
            contributor_shares: self.contributor_shares.clone(),
            accumulated_resources: self.accumulated_resources,
        }
    }
}

/// Immutable copy of a site's composition at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSnapshot {
    pub id: SiteId,
    pub position: GridPos,
    pub owner: Option<AgentId>,
    pub owner_share: f64,
    pub contributor_shares: BTreeMap<AgentId, f64>,
    pub accumulated_resources: f64,
}

impl SiteSnapshot {
    pub fn total_investment(&self) -> f64 {
        self.owner_share + self.contributor_shares.values().sum::<f64>()
    }

    pub fn share_of(&self, agent: AgentId) -> f64 {
        if self.owner == Some(agent) {
            self.owner_share
        } else {
            self.contributor_shares.get(&agent).copied().unwrap_or(0.0)
        }
    }

    /// Every occupant with its share, owner first
    pub fn occupants(&self) -> impl Iterator<Item = (AgentId, f64)> + '_ {
        self.owner
            .map(|owner| (owner, self.owner_share))
            .into_iter()
            .chain(self.contributor_shares.iter().map(|(a, s)| (*a, *s)))
    }
}
