//! Simulation configuration with documented constants
//!
//! Every tunable number the core reads lives here. The values in `Default`
//! are placeholders for tests and `default-config`; real runs supply a full
//! TOML file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SimError};

/// Configuration for a simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    pub world: WorldConfig,
    pub population: PopulationConfig,
    pub search: SearchConfig,
    pub settlement: SettlementConfig,
    pub allocation: AllocationConfig,
    pub belief: BeliefConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorldConfig {
    /// Side length of the square resource grid (cells)
    pub grid_size: usize,

    /// Mean of the per-cell resource draw before normalization
    ///
    /// After normalization the field always carries `grid_size²` total mass;
    /// this value shapes how many cells come up empty.
    pub resource_level: f64,

    /// Aggregation in [0, 1]; higher means clumpier resources
    ///
    /// Maps to the negative binomial shape `n = max(1, 10 / aggregation)`.
    pub aggregation_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PopulationConfig {
    pub primary_count: u32,
    pub secondary_count: u32,

    /// Sites each primary establishes at bootstrap
    pub sites_per_primary: u32,

    /// Sites each secondary is seeded into at bootstrap
    pub sites_per_secondary: u32,

    /// Radius around a primary searched for the richest nest cells at bootstrap
    pub nest_radius: f64,

    /// A primary left with no site establishes one at its own position
    pub establish_when_empty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// λ in `p = 1 - exp(-λ · search / distance)`
    pub search_efficiency: f64,

    /// Floor applied to every believed search investment
    pub min_search_share: f64,

    /// Upper bound of the uniform search seed drawn at bootstrap
    pub initial_search_max: f64,

    /// Radius within which same-role peers are observed for social learning
    pub observation_radius: f64,

    /// Radius within which a secondary considers sites worth contributing to
    pub candidate_radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettlementConfig {
    /// ρ: fraction of the target cell taken per raise action
    pub extraction_rate: f64,

    /// Exploration radius per unit of total site investment
    pub home_range_radius: f64,

    /// Exploration radius floor, so a barely-tended site still forages
    pub min_exploration_radius: f64,

    /// K: offspring ceiling
    pub logistic_k: f64,

    /// r: steepness of the resource-to-offspring curve
    pub logistic_r: f64,

    /// R0: resources at which offspring reach K / 2
    pub logistic_midpoint: f64,

    /// Fixed cost subtracted from a primary's payoff
    pub primary_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocationConfig {
    /// N: greedy steps per decision
    pub steps: u32,

    /// Δ: probe used for the finite-difference marginal utility
    pub probe: f64,

    /// Largest acceptable step `budget / N` for a full budget
    pub max_step: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BeliefConfig {
    /// Prior for the population-typical search investment
    pub search_prior: f64,

    /// Prior for third-party investment at any site
    pub raising_prior: f64,

    /// Variance used to turn a point estimate into Beta pseudo-counts
    pub prior_variance: f64,

    pub prior_alpha_floor: f64,
    pub prior_beta_floor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub rounds: u32,
    pub seed: u64,

    /// Minimum population before the Decide phase runs on rayon
    pub parallel_threshold: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig {
                grid_size: 500,
                resource_level: 0.5,
                aggregation_level: 0.3,
            },
            population: PopulationConfig {
                primary_count: 30,
                secondary_count: 30,
                sites_per_primary: 2,
                sites_per_secondary: 2,
                nest_radius: 50.0,
                establish_when_empty: true,
            },
            search: SearchConfig {
                search_efficiency: 0.3,
                min_search_share: 0.05,
                initial_search_max: 0.95,
                observation_radius: 750.0,
                candidate_radius: 750.0,
            },
            settlement: SettlementConfig {
                extraction_rate: 0.3,
                home_range_radius: 3.0,
                min_exploration_radius: 1.0,
                logistic_k: 10.0,
                logistic_r: 0.1,
                logistic_midpoint: 5.0,
                primary_cost: 0.0,
            },
            allocation: AllocationConfig {
                steps: 20,
                probe: 0.01,
                max_step: 0.05,
            },
            belief: BeliefConfig {
                search_prior: 0.1,
                raising_prior: 0.45,
                prior_variance: 0.01,
                prior_alpha_floor: 1.0,
                prior_beta_floor: 9.0,
            },
            run: RunConfig {
                rounds: 10,
                seed: 42,
                parallel_threshold: 1000,
            },
        }
    }
}

impl SimulationConfig {
    /// Load a complete configuration from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(SimError::InvalidConfig(msg));

        if self.world.grid_size == 0 {
            return fail("world.grid_size must be positive".into());
        }
        if !(self.world.resource_level >= 0.0) {
            return fail(format!(
                "world.resource_level ({}) must be non-negative",
                self.world.resource_level
            ));
        }
        if !(0.0..=1.0).contains(&self.world.aggregation_level) {
            return fail(format!(
                "world.aggregation_level ({}) must lie in [0, 1]",
                self.world.aggregation_level
            ));
        }

        if !(self.population.nest_radius >= 0.0) {
            return fail(format!(
                "population.nest_radius ({}) must be non-negative",
                self.population.nest_radius
            ));
        }

        if !(self.search.search_efficiency > 0.0) {
            return fail("search.search_efficiency must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.search.min_search_share) {
            return fail("search.min_search_share must lie in [0, 1]".into());
        }
        if !(0.0..=1.0).contains(&self.search.initial_search_max)
            || self.search.initial_search_max < self.search.min_search_share
        {
            return fail(
                "search.initial_search_max must lie in [min_search_share, 1]".into(),
            );
        }
        if !(self.search.observation_radius >= 0.0) || !(self.search.candidate_radius >= 0.0) {
            return fail("search radii must be non-negative".into());
        }

        let s = &self.settlement;
        if !(s.extraction_rate > 0.0 && s.extraction_rate <= 1.0) {
            return fail(format!(
                "settlement.extraction_rate ({}) must lie in (0, 1]",
                s.extraction_rate
            ));
        }
        if !(s.home_range_radius >= 0.0) || !(s.min_exploration_radius >= 0.0) {
            return fail("settlement radii must be non-negative".into());
        }
        if !(s.logistic_k > 0.0) || !(s.logistic_r >= 0.0) || !s.logistic_midpoint.is_finite() {
            return fail("settlement logistic constants must satisfy K > 0, r >= 0".into());
        }
        if !s.primary_cost.is_finite() {
            return fail("settlement.primary_cost must be finite".into());
        }

        let a = &self.allocation;
        if a.steps == 0 {
            return fail("allocation.steps must be at least 1".into());
        }
        let full_step = 1.0 / a.steps as f64;
        if !(a.probe > 0.0 && a.probe < full_step) {
            return fail(format!(
                "allocation.probe ({}) must lie in (0, 1 / steps = {:.4})",
                a.probe, full_step
            ));
        }
        if full_step > a.max_step {
            return fail(format!(
                "allocation.steps ({}) too small: step {:.4} exceeds max_step {}",
                a.steps, full_step, a.max_step
            ));
        }

        let b = &self.belief;
        if !(0.0..=1.0).contains(&b.search_prior) {
            return fail("belief.search_prior must lie in [0, 1]".into());
        }
        if !(b.raising_prior >= 0.0) {
            return fail("belief.raising_prior must be non-negative".into());
        }
        if !(b.prior_variance > 0.0) || !(b.prior_alpha_floor > 0.0) || !(b.prior_beta_floor > 0.0) {
            return fail("belief variance and floors must be positive".into());
        }

        let Some(total_sites) = self
            .population
            .primary_count
            .checked_mul(self.population.sites_per_primary)
        else {
            return fail(format!(
                "population.primary_count ({}) x sites_per_primary ({}) exceeds the site id range",
                self.population.primary_count, self.population.sites_per_primary
            ));
        };
        if self.population.secondary_count > 0 && self.population.sites_per_secondary > total_sites {
            return fail(format!(
                "population.sites_per_secondary ({}) exceeds the {} sites created at bootstrap",
                self.population.sites_per_secondary, total_sites
            ));
        }

        Ok(())
    }
}
