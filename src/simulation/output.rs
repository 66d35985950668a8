//! Per-round results and whole-run output

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::types::{AgentId, Role, Round, SiteId};
use crate::world::field::FieldSummary;
use crate::world::site::Site;

/// Composition and yield of one site at the end of a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteReport {
    pub site: SiteId,
    pub owner: Option<AgentId>,
    pub owner_share: f64,
    pub contributor_shares: BTreeMap<AgentId, f64>,
    pub accumulated_resources: f64,
    pub expected_offspring: f64,
    /// Offspring change from one more extraction on the post-round field at
    /// unchanged investment
    pub marginal_offspring: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualReport {
    pub agent: AgentId,
    pub role: Role,
    pub search_investment: f64,
    pub raise_total: f64,
    pub sites_raised: usize,
    pub payoff: f64,
}

/// Who raises with whom, from the secondaries' point of view
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MatingSystemStats {
    /// Sites with no contributing secondary
    pub unattended_sites: usize,
    /// Sites with exactly one contributing secondary
    pub monogamous_sites: usize,
    /// Sites with two or more contributing secondaries
    pub polyandrous_sites: usize,
    /// Secondaries contributing to two or more sites
    pub polygynous_secondaries: usize,
    pub mean_contributors_per_site: f64,
}

impl MatingSystemStats {
    pub fn from_sites(sites: &[Site]) -> Self {
        let mut stats = Self::default();
        let mut per_secondary: BTreeMap<AgentId, usize> = BTreeMap::new();

        for site in sites {
            match site.contributor_count() {
                0 => stats.unattended_sites += 1,
                1 => stats.monogamous_sites += 1,
                _ => stats.polyandrous_sites += 1,
            }
            for agent in site.contributors() {
                *per_secondary.entry(agent).or_default() += 1;
            }
        }

        let contributions: usize = per_secondary.values().sum();
        stats.polygynous_secondaries = per_secondary.values().filter(|n| **n >= 2).count();
        stats.mean_contributors_per_site = if sites.is_empty() {
            0.0
        } else {
            contributions as f64 / sites.len() as f64
        };
        stats
    }
}

/// Results record of one completed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub round: Round,
    /// Field as strategies saw it
    pub field_before: FieldSummary,
    /// Field once every extraction of the round has landed
    pub field_after: FieldSummary,
    pub sites: Vec<SiteReport>,
    pub individuals: Vec<IndividualReport>,
    pub searches_attempted: usize,
    pub searches_succeeded: usize,
    pub total_extracted: f64,
    pub mating: MatingSystemStats,
}

impl RoundReport {
    pub fn mean_search(&self, role: Role) -> f64 {
        let values: Vec<f64> = self
            .individuals
            .iter()
            .filter(|i| i.role == role)
            .map(|i| i.search_investment)
            .collect();
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    pub fn total_payoff(&self, role: Role) -> f64 {
        self.individuals
            .iter()
            .filter(|i| i.role == role)
            .map(|i| i.payoff)
            .sum()
    }
}

/// Complete simulation output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub rounds: Vec<RoundReport>,
    pub statistics: SimulationStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationStats {
    pub rounds_simulated: u32,
    pub simulation_time_ms: u64,
    pub total_extracted: f64,
    pub searches_attempted: usize,
    pub searches_succeeded: usize,
    pub final_mean_search_primary: f64,
    pub final_mean_search_secondary: f64,
    pub final_mating: MatingSystemStats,
}

impl SimulationOutput {
    pub fn new(rounds: Vec<RoundReport>, elapsed: Duration) -> Self {
        let last = rounds.last();
        let statistics = SimulationStats {
            rounds_simulated: rounds.len() as u32,
            simulation_time_ms: elapsed.as_millis() as u64,
            total_extracted: rounds.iter().map(|r| r.total_extracted).sum(),
            searches_attempted: rounds.iter().map(|r| r.searches_attempted).sum(),
            searches_succeeded: rounds.iter().map(|r| r.searches_succeeded).sum(),
            final_mean_search_primary: last.map_or(0.0, |r| r.mean_search(Role::Primary)),
            final_mean_search_secondary: last.map_or(0.0, |r| r.mean_search(Role::Secondary)),
            final_mating: last.map(|r| r.mating).unwrap_or_default(),
        };
        Self { rounds, statistics }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn summary(&self) -> String {
        let s = &self.statistics;
        format!(
            "Simulated {} rounds in {}ms\n{:.2} resources extracted, {}/{} searches succeeded\n\
             final mean search: primary {:.3}, secondary {:.3}\n\
             sites: {} unattended, {} monogamous, {} polyandrous; {} polygynous secondaries",
            s.rounds_simulated,
            s.simulation_time_ms,
            s.total_extracted,
            s.searches_succeeded,
            s.searches_attempted,
            s.final_mean_search_primary,
            s.final_mean_search_secondary,
            s.final_mating.unattended_sites,
            s.final_mating.monogamous_sites,
            s.final_mating.polyandrous_sites,
            s.final_mating.polygynous_secondaries,
        )
    }
}
