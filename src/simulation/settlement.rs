//! Settlement: site investment -> extracted resources -> offspring -> payoff
//!
//! Live settlement mutates the environment (cell depletion, site
//! accumulators). The counterfactual functions at the bottom compute the same
//! quantities over a supplied field without touching any stored state; the
//! strategies use them as payoff functions and reports use them for
//! sensitivity analysis.

use crate::core::config::SettlementConfig;
use crate::core::error::{ensure_finite, Result};
use crate::core::types::{AgentId, GridPos, SiteId};
use crate::world::environment::Environment;
use crate::world::field::ResourceField;
use crate::world::site::{Site, SiteSnapshot};

/// How far a site's tenders forage for a given total investment
///
/// Linear in investment, never below the configured floor.
pub fn exploration_radius(total_investment: f64, config: &SettlementConfig) -> f64 {
    (config.home_range_radius * total_investment.max(0.0)).max(config.min_exploration_radius)
}

/// Logistic resource-to-offspring curve `K / (1 + exp(-r (R - R0)))`
pub fn offspring(resources: f64, config: &SettlementConfig) -> f64 {
    config.logistic_k / (1.0 + (-config.logistic_r * (resources - config.logistic_midpoint)).exp())
}

/// One raise action's extraction for `site`
///
/// Takes ρ of the richest cell within the site's exploration radius and adds
/// it to the site's accumulator. With nothing reachable it returns 0 and
/// leaves everything untouched.
pub fn extract(env: &mut Environment, site: SiteId, config: &SettlementConfig) -> Result<f64> {
    let (position, radius) = {
        let s = env.site(site)?;
        (s.position, exploration_radius(s.total_investment(), config))
    };

    let Some((target, _)) = env.best_cell_within(position, radius) else {
        return Ok(0.0);
    };

    let amount = env.extract(target, config.extraction_rate)?;
    env.site_mut(site)?.add_resources(amount);

    tracing::debug!(%site, %target, amount, radius, "extracted");
    Ok(amount)
}

/// Record the offspring a site's accumulated resources produce
pub fn settle_site(site: &mut Site, config: &SettlementConfig) -> Result<f64> {
    let value = ensure_finite(offspring(site.accumulated_resources(), config), || {
        format!("offspring at {}", site.id)
    })?;
    site.expected_offspring = value;
    Ok(value)
}

/// Sum of offspring over every owned site, minus the fixed cost
pub fn payoff_primary(env: &Environment, agent: AgentId, config: &SettlementConfig) -> Result<f64> {
    let individual = env.individual(agent)?;
    let mut total = 0.0;
    for site in &individual.owned_sites {
        total += offspring(env.site(*site)?.accumulated_resources(), config);
    }
    ensure_finite(total - config.primary_cost, || format!("payoff of {}", agent))
}

/// Investment-weighted share of offspring at every site contributed to
///
/// A site with zero total investment contributes nothing.
pub fn payoff_secondary(env: &Environment, agent: AgentId, config: &SettlementConfig) -> Result<f64> {
    let individual = env.individual(agent)?;
    let mut total = 0.0;
    for (site_id, _) in individual.active_sites() {
        let site = env.site(site_id)?;
        let invested = site.total_investment();
        if invested <= 0.0 {
            continue;
        }
        let share = site.contributor_share(agent) / invested;
        total += share * offspring(site.accumulated_resources(), config);
    }
    ensure_finite(total, || format!("payoff of {}", agent))
}

// === COUNTERFACTUALS ===

/// Offspring a site at `position` would produce from one extraction at the
/// given total investment, on top of `accumulated` resources
pub fn counterfactual_offspring(
    field: &ResourceField,
    position: GridPos,
    total_investment: f64,
    accumulated: f64,
    config: &SettlementConfig,
) -> f64 {
    let radius = exploration_radius(total_investment, config);
    let extracted = field
        .best_cell_within(position, radius)
        .map_or(0.0, |(_, value)| value * config.extraction_rate);
    offspring(accumulated + extracted, config)
}

/// A primary's expected payoff at one owned site
pub fn counterfactual_primary_payoff(
    field: &ResourceField,
    position: GridPos,
    own: f64,
    others: f64,
    config: &SettlementConfig,
) -> f64 {
    counterfactual_offspring(field, position, own + others, 0.0, config)
}

/// A secondary's expected payoff at one site: its investment share of the
/// offspring
pub fn counterfactual_secondary_payoff(
    field: &ResourceField,
    position: GridPos,
    own: f64,
    others: f64,
    config: &SettlementConfig,
) -> f64 {
    let total = own + others;
    if total <= 0.0 {
        return 0.0;
    }
    own / total * counterfactual_offspring(field, position, total, 0.0, config)
}

/// Offspring of a snapshotted site had its total investment been `investment`
pub fn offspring_with_investment(
    snapshot: &SiteSnapshot,
    field: &ResourceField,
    investment: f64,
    config: &SettlementConfig,
) -> f64 {
    counterfactual_offspring(
        field,
        snapshot.position,
        investment,
        snapshot.accumulated_resources,
        config,
    )
}
