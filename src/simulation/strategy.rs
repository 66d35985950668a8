//! Decision logic behind a capability trait
//!
//! The round coordinator only knows `Strategy`. Which concrete strategy an
//! individual runs is a per-agent binding that can be swapped between rounds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::config::{SettlementConfig, SimulationConfig};
use crate::core::error::Result;
use crate::core::types::{AgentId, GridPos, Role, SiteId};
use crate::entity::individual::{Individual, ENERGY_BUDGET};
use crate::simulation::allocation::{allocate, AllocationParams};
use crate::simulation::belief::BeliefStore;
use crate::simulation::settlement::{counterfactual_primary_payoff, counterfactual_secondary_payoff};
use crate::simulation::snapshot::RoundSnapshot;

/// What a strategy knows about the individual it decides for
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionContext {
    pub agent: AgentId,
    pub role: Role,
    pub position: GridPos,
    pub owned_sites: Vec<SiteId>,
    /// Sites the individual raised at last round
    pub current_sites: Vec<SiteId>,
}

impl DecisionContext {
    pub fn from_individual(individual: &Individual) -> Self {
        Self {
            agent: individual.id,
            role: individual.role,
            position: individual.position,
            owned_sites: individual.owned_sites.clone(),
            current_sites: individual.active_sites().map(|(site, _)| site).collect(),
        }
    }
}

/// One individual's split of its energy budget for the coming round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub search_investment: f64,
    pub raise_investments: BTreeMap<SiteId, f64>,
}

impl Decision {
    /// Entire budget on search, nothing raised
    pub fn search_only() -> Self {
        Self {
            search_investment: ENERGY_BUDGET,
            raise_investments: BTreeMap::new(),
        }
    }

    pub fn total(&self) -> f64 {
        self.search_investment + self.raise_investments.values().sum::<f64>()
    }
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Split the budget using only the snapshot and the agent's beliefs
    fn decide(
        &self,
        ctx: &DecisionContext,
        snapshot: &RoundSnapshot,
        beliefs: &BeliefStore,
    ) -> Result<Decision>;
}

/// Believed population search norm, floored and kept inside the budget
pub fn search_share(belief: f64, min_search_share: f64) -> f64 {
    belief.max(min_search_share).clamp(0.0, ENERGY_BUDGET)
}

/// Shared skeleton: search from belief, the rest through the optimizer
fn decide_over<F>(
    ctx: &DecisionContext,
    snapshot: &RoundSnapshot,
    beliefs: &BeliefStore,
    candidates: &[SiteId],
    min_search_share: f64,
    params: AllocationParams,
    payoff: F,
) -> Result<Decision>
where
    F: Fn(GridPos, f64, f64) -> f64,
{
    if candidates.is_empty() {
        return Ok(Decision::search_only());
    }

    let mut positions = BTreeMap::new();
    for site in candidates {
        positions.insert(*site, snapshot.site(*site)?.position);
    }

    let search = search_share(beliefs.get_search_belief(ctx.agent), min_search_share);
    let budget = ENERGY_BUDGET - search;

    let raise = allocate(
        budget,
        candidates,
        |site| beliefs.get_raising_belief(ctx.agent, site),
        |site, own, others| positions.get(&site).map_or(0.0, |pos| payoff(*pos, own, others)),
        params,
    )?;

    tracing::debug!(
        agent = %ctx.agent,
        search,
        sites = raise.values().filter(|v| **v > 0.0).count(),
        "decided"
    );

    Ok(Decision {
        search_investment: search,
        raise_investments: raise,
    })
}

/// Primaries: raise only at owned sites, valuing each by the offspring it
/// would produce
#[derive(Debug, Clone)]
pub struct OwnerStrategy {
    min_search_share: f64,
    allocation: AllocationParams,
    settlement: SettlementConfig,
}

impl OwnerStrategy {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            min_search_share: config.search.min_search_share,
            allocation: AllocationParams::from(&config.allocation),
            settlement: config.settlement.clone(),
        }
    }
}

impl Strategy for OwnerStrategy {
    fn name(&self) -> &'static str {
        "owner"
    }

    fn decide(
        &self,
        ctx: &DecisionContext,
        snapshot: &RoundSnapshot,
        beliefs: &BeliefStore,
    ) -> Result<Decision> {
        decide_over(
            ctx,
            snapshot,
            beliefs,
            &ctx.owned_sites,
            self.min_search_share,
            self.allocation,
            |pos, own, others| {
                counterfactual_primary_payoff(&snapshot.field, pos, own, others, &self.settlement)
            },
        )
    }
}

/// Secondaries: raise at any nearby site (or one already tended), valuing
/// each by their investment share of its offspring
#[derive(Debug, Clone)]
pub struct ContributorStrategy {
    min_search_share: f64,
    candidate_radius: f64,
    allocation: AllocationParams,
    settlement: SettlementConfig,
}

impl ContributorStrategy {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            min_search_share: config.search.min_search_share,
            candidate_radius: config.search.candidate_radius,
            allocation: AllocationParams::from(&config.allocation),
            settlement: config.settlement.clone(),
        }
    }

    fn candidates(&self, ctx: &DecisionContext, snapshot: &RoundSnapshot) -> Vec<SiteId> {
        let mut sites = snapshot.sites_within(ctx.position, self.candidate_radius);
        sites.extend(ctx.current_sites.iter().copied());
        sites.sort_unstable();
        sites.dedup();
        sites
    }
}

impl Strategy for ContributorStrategy {
    fn name(&self) -> &'static str {
        "contributor"
    }

    fn decide(
        &self,
        ctx: &DecisionContext,
        snapshot: &RoundSnapshot,
        beliefs: &BeliefStore,
    ) -> Result<Decision> {
        let candidates = self.candidates(ctx, snapshot);
        decide_over(
            ctx,
            snapshot,
            beliefs,
            &candidates,
            self.min_search_share,
            self.allocation,
            |pos, own, others| {
                counterfactual_secondary_payoff(&snapshot.field, pos, own, others, &self.settlement)
            },
        )
    }
}

/// Fixed split, handy for pinning an individual's behaviour in experiments
#[derive(Debug, Clone)]
pub struct FixedStrategy {
    pub decision: Decision,
}

impl Strategy for FixedStrategy {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn decide(&self, _: &DecisionContext, _: &RoundSnapshot, _: &BeliefStore) -> Result<Decision> {
        Ok(self.decision.clone())
    }
}
