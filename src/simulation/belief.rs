//! Belief store: per-individual posterior point estimates
//!
//! Two independent belief classes, each updated once per round from the
//! observations submitted during that round:
//!
//! - search belief: the population-typical search investment, learned from
//!   same-role peers weighted by how well they did
//! - raising belief: the aggregate investment other individuals put into each
//!   site, learned from site compositions revealed by successful searches
//!
//! Readers only see posteriors through the getters. Anything never observed
//! reads as the static prior.

use std::collections::BTreeMap;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::config::BeliefConfig;
use crate::core::error::{Result, SimError};
use crate::core::types::{AgentId, Role, SiteId};

/// One peer seen this round: what it spent on search and what it earned
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchObservation {
    pub search_investment: f64,
    pub payoff: f64,
}

/// Mean observed share of one contributor class at one site
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassShare {
    pub mean: f64,
    pub count: usize,
}

impl ClassShare {
    fn total(&self) -> f64 {
        self.mean * self.count as f64
    }
}

#[derive(Debug, Clone)]
struct SearchBelief {
    posterior_mean: f64,
    pending: Vec<SearchObservation>,
}

pub struct BeliefStore {
    config: BeliefConfig,
    roles: AHashMap<AgentId, Role>,
    search: AHashMap<AgentId, SearchBelief>,
    raising: AHashMap<AgentId, BTreeMap<SiteId, f64>>,
    /// This round's revealed shares, deduplicated per (site, contributor)
    pending_raising: BTreeMap<(SiteId, AgentId), f64>,
    /// Class means from the most recent raising update
    class_shares: BTreeMap<(SiteId, Role), ClassShare>,
}

impl BeliefStore {
    pub fn new(config: BeliefConfig) -> Self {
        Self {
            config,
            roles: AHashMap::new(),
            search: AHashMap::new(),
            raising: AHashMap::new(),
            pending_raising: BTreeMap::new(),
            class_shares: BTreeMap::new(),
        }
    }

    /// Seed an individual with the static priors
    pub fn register(&mut self, agent: AgentId, role: Role) {
        self.roles.insert(agent, role);
        self.search.entry(agent).or_insert_with(|| SearchBelief {
            posterior_mean: self.config.search_prior,
            pending: Vec::new(),
        });
        self.raising.entry(agent).or_default();
    }

    pub fn role_of(&self, agent: AgentId) -> Option<Role> {
        self.roles.get(&agent).copied()
    }

    // === SUBMISSION ===

    /// Queue the cohort an individual observed this round
    pub fn submit_search_observation(&mut self, agent: AgentId, cohort: &[SearchObservation]) -> Result<()> {
        let belief = self.search.get_mut(&agent).ok_or(SimError::UnknownAgent(agent))?;
        belief.pending.extend_from_slice(cohort);
        Ok(())
    }

    /// Queue one revealed share; repeated sightings of the same contributor
    /// at the same site within a round count once
    pub fn submit_raising_observation(&mut self, site: SiteId, contributor: AgentId, share: f64) -> Result<()> {
        if !self.roles.contains_key(&contributor) {
            return Err(SimError::UnknownAgent(contributor));
        }
        self.pending_raising.insert((site, contributor), share);
        Ok(())
    }

    pub fn pending_raising_count(&self) -> usize {
        self.pending_raising.len()
    }

    pub fn pending_search_count(&self, agent: AgentId) -> usize {
        self.search.get(&agent).map_or(0, |b| b.pending.len())
    }

    // === UPDATE ===

    /// End-of-round update of both belief classes from everything submitted
    /// since the previous call
    pub fn update_beliefs(&mut self) {
        self.update_search_beliefs();
        self.update_raising_beliefs();
    }

    /// Beta-conjugate update of each individual's search belief
    ///
    /// The prior mean becomes pseudo-counts through the configured variance
    /// (floored), and the payoff-weighted cohort mean is added as a single
    /// observation.
    pub(crate) fn update_search_beliefs(&mut self) {
        let config = &self.config;
        for belief in self.search.values_mut() {
            if belief.pending.is_empty() {
                continue;
            }
            let observed = weighted_search_mean(&belief.pending);
            belief.posterior_mean = beta_posterior_mean(belief.posterior_mean, observed, config);
            belief.pending.clear();
        }
    }

    /// Update every individual's per-site estimate of third-party investment
    pub(crate) fn update_raising_beliefs(&mut self) {
        if self.pending_raising.is_empty() {
            return;
        }

        // Per site and class: mean share and count
        let mut sums: BTreeMap<(SiteId, Role), (f64, usize)> = BTreeMap::new();
        for (&(site, contributor), &share) in &self.pending_raising {
            let role = self.roles.get(&contributor).copied().unwrap_or(Role::Secondary);
            let entry = sums.entry((site, role)).or_insert((0.0, 0));
            entry.0 += share;
            entry.1 += 1;
        }
        self.class_shares = sums
            .into_iter()
            .map(|(key, (sum, count))| (key, ClassShare { mean: sum / count as f64, count }))
            .collect();

        // Per site: total observed investment and number of observed occupants
        let mut site_totals: BTreeMap<SiteId, (f64, usize)> = BTreeMap::new();
        for (&(site, _), class) in &self.class_shares {
            let entry = site_totals.entry(site).or_insert((0.0, 0));
            entry.0 += class.total();
            entry.1 += class.count;
        }

        let prior = self.config.raising_prior;
        for (&agent, beliefs) in self.raising.iter_mut() {
            for (&site, &(total, count)) in &site_totals {
                let own = self.pending_raising.get(&(site, agent)).copied();
                let others_seen = count - usize::from(own.is_some());
                if others_seen == 0 {
                    continue;
                }
                let observed = (total - own.unwrap_or(0.0)).max(0.0);
                let n = others_seen as f64;
                let current = beliefs.entry(site).or_insert(prior);
                *current = (*current + n * observed) / (1.0 + n);
            }
        }

        self.pending_raising.clear();
    }

    // === READ ===

    /// Believed population-typical search investment
    pub fn get_search_belief(&self, agent: AgentId) -> f64 {
        self.search
            .get(&agent)
            .map_or(self.config.search_prior, |b| b.posterior_mean)
    }

    /// Believed aggregate investment by others at `site`
    pub fn get_raising_belief(&self, agent: AgentId, site: SiteId) -> f64 {
        self.raising
            .get(&agent)
            .and_then(|sites| sites.get(&site))
            .copied()
            .unwrap_or(self.config.raising_prior)
    }

    /// Class mean from the latest raising update, if that class was seen
    pub fn class_mean_share(&self, site: SiteId, role: Role) -> Option<ClassShare> {
        self.class_shares.get(&(site, role)).copied()
    }
}

/// Payoff-weighted mean search investment of a cohort
///
/// Negative payoffs carry no weight; with no positive payoff at all every
/// peer counts equally.
fn weighted_search_mean(cohort: &[SearchObservation]) -> f64 {
    let total: f64 = cohort.iter().map(|o| o.payoff.max(0.0)).sum();
    if total > 0.0 {
        cohort
            .iter()
            .map(|o| o.payoff.max(0.0) / total * o.search_investment)
            .sum()
    } else {
        cohort.iter().map(|o| o.search_investment).sum::<f64>() / cohort.len() as f64
    }
}

fn beta_posterior_mean(prior_mean: f64, observed: f64, config: &BeliefConfig) -> f64 {
    let m = prior_mean.clamp(0.0, 1.0);
    let concentration = m * (1.0 - m) / config.prior_variance - 1.0;
    let alpha = (m * concentration).max(config.prior_alpha_floor);
    let beta = ((1.0 - m) * concentration).max(config.prior_beta_floor);
    let x = observed.clamp(0.0, 1.0);
    (alpha + x) / (alpha + beta + 1.0)
}
