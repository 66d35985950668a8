//! Individuals: the decision-making birds
//!
//! An individual holds state only. What it does each round is decided by the
//! strategy bound to it and applied by the round coordinator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{AgentId, GridPos, Role, SiteId};

/// Per-round energy budget every individual splits between search and raising
pub const ENERGY_BUDGET: f64 = 1.0;

/// Tolerance for the budget identity `search + Σ raise == 1`
pub const BUDGET_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub id: AgentId,
    pub role: Role,
    pub position: GridPos,
    pub search_investment: f64,
    raise_investments: BTreeMap<SiteId, f64>,
    /// Sites this individual owns (primaries only)
    pub owned_sites: Vec<SiteId>,
}

impl Individual {
    /// New individual that spends its whole budget searching
    pub fn new(id: AgentId, role: Role, position: GridPos) -> Self {
        Self {
            id,
            role,
            position,
            search_investment: ENERGY_BUDGET,
            raise_investments: BTreeMap::new(),
            owned_sites: Vec::new(),
        }
    }

    pub fn is_primary(&self) -> bool {
        self.role == Role::Primary
    }

    pub fn raise_investment(&self, site: SiteId) -> f64 {
        self.raise_investments.get(&site).copied().unwrap_or(0.0)
    }

    pub fn raise_investments(&self) -> &BTreeMap<SiteId, f64> {
        &self.raise_investments
    }

    pub fn total_raise(&self) -> f64 {
        self.raise_investments.values().sum()
    }

    /// Sites with a positive raise investment
    pub fn active_sites(&self) -> impl Iterator<Item = (SiteId, f64)> + '_ {
        self.raise_investments
            .iter()
            .filter(|(_, share)| **share > 0.0)
            .map(|(site, share)| (*site, *share))
    }

    /// Replace the whole split; zero entries are dropped
    pub fn set_investments(&mut self, search: f64, raise: &BTreeMap<SiteId, f64>) {
        self.search_investment = search;
        self.raise_investments = raise
            .iter()
            .filter(|(_, share)| **share > 0.0)
            .map(|(site, share)| (*site, *share))
            .collect();
    }

    /// `search + Σ raise` equals the energy budget within tolerance
    pub fn budget_balanced(&self) -> bool {
        (self.search_investment + self.total_raise() - ENERGY_BUDGET).abs() <= BUDGET_TOLERANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_individual_searches_everything() {
        let ind = Individual::new(AgentId(1), Role::Secondary, GridPos::new(0, 0));
        assert_eq!(ind.search_investment, 1.0);
        assert!(ind.budget_balanced());
        assert!(!ind.is_primary());
    }

    #[test]
    fn test_set_investments_drops_zeros() {
        let mut ind = Individual::new(AgentId(1), Role::Primary, GridPos::new(0, 0));
        let raise: BTreeMap<SiteId, f64> =
            [(SiteId(0), 0.6), (SiteId(1), 0.0), (SiteId(2), 0.3)].into_iter().collect();
        ind.set_investments(0.1, &raise);

        assert_eq!(ind.raise_investments().len(), 2);
        assert_eq!(ind.raise_investment(SiteId(1)), 0.0);
        assert!(ind.budget_balanced());
        assert_eq!(ind.active_sites().count(), 2);
    }

    #[test]
    fn test_unbalanced_budget_detected() {
        let mut ind = Individual::new(AgentId(1), Role::Primary, GridPos::new(0, 0));
        let raise: BTreeMap<SiteId, f64> = [(SiteId(0), 0.5)].into_iter().collect();
        ind.set_investments(0.1, &raise);
        assert!(!ind.budget_balanced());
    }
}
