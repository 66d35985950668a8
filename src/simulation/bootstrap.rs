//! Initial population: individuals, nests and seeded investments

use std::cmp::Reverse;
use std::collections::BTreeMap;

use ahash::AHashSet;
use ordered_float::OrderedFloat;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::config::SimulationConfig;
use crate::core::error::{Result, SimError};
use crate::core::types::{AgentId, GridPos, Role, SiteId};
use crate::entity::individual::{Individual, ENERGY_BUDGET};
use crate::simulation::belief::BeliefStore;
use crate::world::environment::Environment;
use crate::world::field::ResourceField;

/// Build the world for round 0
///
/// Primaries are placed uniformly at random and each claims the richest free
/// cells within `nest_radius` as its nests. Secondaries are placed at random
/// and seeded into a random sample of nests with random proportions. Every
/// individual starts with a search share drawn from
/// `[min_search_share, initial_search_max]`.
pub fn bootstrap<R: Rng + ?Sized>(config: &SimulationConfig, rng: &mut R) -> Result<(Environment, BeliefStore)> {
    config.validate()?;

    let mut env = Environment::generate(&config.world, config.search.search_efficiency, rng);
    let mut beliefs = BeliefStore::new(config.belief.clone());
    let size = config.world.grid_size as i64;
    let pop = &config.population;

    let mut next_id = 0u32;
    let mut spawn = |env: &mut Environment, role: Role, rng: &mut R| -> Result<AgentId> {
        let position = GridPos::new(rng.gen_range(0..size), rng.gen_range(0..size));
        let id = env.add_individual(Individual::new(AgentId(next_id), role, position))?;
        next_id += 1;
        Ok(id)
    };

    let mut primaries = Vec::with_capacity(pop.primary_count as usize);
    for _ in 0..pop.primary_count {
        primaries.push(spawn(&mut env, Role::Primary, rng)?);
    }
    let mut secondaries = Vec::with_capacity(pop.secondary_count as usize);
    for _ in 0..pop.secondary_count {
        secondaries.push(spawn(&mut env, Role::Secondary, rng)?);
    }

    // Nests go on the richest unclaimed cells around each primary
    let mut claimed: AHashSet<GridPos> = AHashSet::new();
    for &agent in &primaries {
        let home = env.individual(agent)?.position;
        let cells = richest_cells(env.field(), home, pop.nest_radius, pop.sites_per_primary as usize, &claimed);
        for cell in cells {
            claimed.insert(cell);
            env.create_site(Some(agent), cell)?;
        }
    }

    // Seed primaries across their own nests
    for &agent in &primaries {
        let search = seed_search(config, rng);
        let owned = env.individual(agent)?.owned_sites.clone();
        let raise = split_evenly(&owned, ENERGY_BUDGET - search);
        commit_seed(&mut env, agent, search, raise)?;
    }

    // Seed secondaries into random nests with random proportions
    let all_sites: Vec<SiteId> = env.sites().iter().map(|s| s.id).collect();
    for &agent in &secondaries {
        let search = seed_search(config, rng);
        let chosen: Vec<SiteId> = all_sites
            .choose_multiple(rng, pop.sites_per_secondary as usize)
            .copied()
            .collect();
        let raise = split_randomly(&chosen, ENERGY_BUDGET - search, rng);
        commit_seed(&mut env, agent, search, raise)?;
    }

    for ind in env.individuals() {
        beliefs.register(ind.id, ind.role);
    }

    tracing::info!(
        primaries = primaries.len(),
        secondaries = secondaries.len(),
        sites = env.sites().len(),
        "bootstrap complete"
    );

    Ok((env, beliefs))
}

/// Up to `count` strictly positive cells within `radius`, richest first,
/// skipping `claimed`; ties keep row-major order
fn richest_cells(
    field: &ResourceField,
    center: GridPos,
    radius: f64,
    count: usize,
    claimed: &AHashSet<GridPos>,
) -> Vec<GridPos> {
    let mut cells: Vec<(GridPos, f64)> = field
        .cells_within(center, radius)
        .filter(|pos| !claimed.contains(pos))
        .filter_map(|pos| field.get(pos).ok().map(|v| (pos, v)))
        .collect();
    // Stable sort: equal values stay in scan order
    cells.sort_by_key(|(_, value)| Reverse(OrderedFloat(*value)));

    let mut chosen: Vec<GridPos> = cells
        .iter()
        .filter(|(_, value)| *value > 0.0)
        .take(count)
        .map(|(pos, _)| *pos)
        .collect();

    // A barren neighbourhood still gets its nests, on empty cells in scan order
    if chosen.len() < count {
        for (pos, _) in cells.iter().filter(|(_, value)| *value <= 0.0) {
            if chosen.len() == count {
                break;
            }
            chosen.push(*pos);
        }
    }
    chosen
}

fn seed_search<R: Rng + ?Sized>(config: &SimulationConfig, rng: &mut R) -> f64 {
    let low = config.search.min_search_share;
    let high = config.search.initial_search_max;
    if high > low {
        rng.gen_range(low..high)
    } else {
        low
    }
}

fn split_evenly(sites: &[SiteId], budget: f64) -> BTreeMap<SiteId, f64> {
    if sites.is_empty() {
        return BTreeMap::new();
    }
    let share = budget / sites.len() as f64;
    sites.iter().map(|s| (*s, share)).collect()
}

fn split_randomly<R: Rng + ?Sized>(sites: &[SiteId], budget: f64, rng: &mut R) -> BTreeMap<SiteId, f64> {
    let weights: Vec<f64> = sites.iter().map(|_| rng.gen::<f64>()).collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return split_evenly(sites, budget);
    }
    sites
        .iter()
        .zip(weights)
        .map(|(s, w)| (*s, budget * w / total))
        .collect()
}

/// Write a seeded split into the individual and the site registry
///
/// With no site to raise at, the whole budget goes to search.
fn commit_seed(env: &mut Environment, agent: AgentId, search: f64, raise: BTreeMap<SiteId, f64>) -> Result<()> {
    let search = if raise.is_empty() { ENERGY_BUDGET } else { search };
    for (&site_id, &share) in &raise {
        let site = env.site_mut(site_id)?;
        if site.owner == Some(agent) {
            site.set_owner_share(share);
        } else {
            site.set_contributor_share(agent, share);
        }
    }
    let individual = env.individual_mut(agent)?;
    individual.set_investments(search, &raise);
    if !individual.budget_balanced() {
        return Err(SimError::NumericalAnomaly(format!(
            "seeded budget of {} does not balance",
            agent
        )));
    }
    Ok(())
}
