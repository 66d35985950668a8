//! Integration tests for the round loop
//!
//! These tests drive whole simulations end-to-end:
//! - Bootstrap and the budget identity
//! - Seeded determinism
//! - Belief learning across rounds
//! - Strategy swapping between rounds
//! - Shuffled, path-dependent extraction

use std::collections::BTreeMap;
use std::sync::Arc;

use nestlings::core::config::{SimulationConfig, WorldConfig};
use nestlings::core::types::{AgentId, GridPos, Role, SiteId};
use nestlings::entity::Individual;
use nestlings::simulation::settlement::offspring;
use nestlings::simulation::{BeliefStore, Decision, FixedStrategy, Simulation};
use nestlings::world::{Environment, FieldGenerator, ResourceField};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn small_config(seed: u64) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.world.grid_size = 50;
    config.population.primary_count = 6;
    config.population.secondary_count = 9;
    config.population.nest_radius = 8.0;
    config.search.observation_radius = 80.0;
    config.search.candidate_radius = 80.0;
    config.run.seed = seed;
    config
}

// ============================================================================
// Budget and Bookkeeping
// ============================================================================

#[test]
fn test_budget_identity_holds_every_round() {
    let mut sim = Simulation::new(small_config(1)).unwrap();
    for _ in 0..5 {
        let report = sim.run_round().unwrap();
        for ind in &report.individuals {
            let total = ind.search_investment + ind.raise_total;
            assert!((total - 1.0).abs() < 1e-9, "{} spent {}", ind.agent, total);
        }
    }
}

#[test]
fn test_site_shares_match_individual_investments() {
    let mut sim = Simulation::new(small_config(2)).unwrap();
    sim.run_round().unwrap();

    let env = sim.environment();
    for ind in env.individuals() {
        for (site, share) in ind.active_sites() {
            assert_eq!(env.site(site).unwrap().share_of(ind.id), share);
        }
    }
    for site in env.sites() {
        for contributor in site.contributors() {
            assert!(env.individual(contributor).unwrap().raise_investment(site.id) > 0.0);
        }
    }
}

#[test]
fn test_reports_cover_population_and_sites() {
    let mut sim = Simulation::new(small_config(3)).unwrap();
    let output = sim.run(4).unwrap();

    assert_eq!(output.rounds.len(), 4);
    assert_eq!(output.statistics.rounds_simulated, 4);
    for (i, report) in output.rounds.iter().enumerate() {
        assert_eq!(report.round, i as u32);
        assert_eq!(report.individuals.len(), 15);
        assert_eq!(report.sites.len(), 12);
        assert!(report.searches_succeeded <= report.searches_attempted);
        let m = report.mating;
        assert_eq!(m.unattended_sites + m.monogamous_sites + m.polyandrous_sites, 12);
        for site in &report.sites {
            assert!(site.expected_offspring > 0.0);
        }
    }
    assert!(output.summary().contains("Simulated 4 rounds"));
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_same_seed_same_run() {
    let a = Simulation::new(small_config(42)).unwrap().run(5).unwrap();
    let b = Simulation::new(small_config(42)).unwrap().run(5).unwrap();
    assert_eq!(a.rounds, b.rounds);
}

#[test]
fn test_different_seed_different_run() {
    let a = Simulation::new(small_config(42)).unwrap().run(2).unwrap();
    let b = Simulation::new(small_config(43)).unwrap().run(2).unwrap();
    assert_ne!(a.rounds, b.rounds);
}

// ============================================================================
// Beliefs
// ============================================================================

#[test]
fn test_search_beliefs_move_off_prior() {
    let config = small_config(5);
    let prior = config.belief.search_prior;
    let mut sim = Simulation::new(config).unwrap();
    sim.run(3).unwrap();

    let beliefs = sim.beliefs();
    let moved = sim
        .environment()
        .individuals()
        .iter()
        .filter(|i| (beliefs.get_search_belief(i.id) - prior).abs() > 1e-12)
        .count();
    assert!(moved > 0);
}

#[test]
fn test_raising_beliefs_learned_from_searches() {
    let mut config = small_config(6);
    // Strong search makes discoveries near certain
    config.search.search_efficiency = 50.0;
    let prior = config.belief.raising_prior;
    let mut sim = Simulation::new(config).unwrap();
    let report = sim.run_round().unwrap();
    assert!(report.searches_succeeded > 0);

    let beliefs = sim.beliefs();
    let env = sim.environment();
    let learned = env.individuals().iter().any(|ind| {
        env.sites()
            .iter()
            .any(|site| (beliefs.get_raising_belief(ind.id, site.id) - prior).abs() > 1e-12)
    });
    assert!(learned);
}

// ============================================================================
// Strategy Swapping
// ============================================================================

#[test]
fn test_swapped_strategy_applies_next_round() {
    let mut sim = Simulation::new(small_config(7)).unwrap();
    sim.run_round().unwrap();

    let owner = AgentId(0);
    let site = sim.environment().individual(owner).unwrap().owned_sites[0];
    let raise: BTreeMap<SiteId, f64> = [(site, 0.75)].into_iter().collect();
    sim.bind_strategy(
        owner,
        Arc::new(FixedStrategy {
            decision: Decision {
                search_investment: 0.25,
                raise_investments: raise,
            },
        }),
    )
    .unwrap();

    let report = sim.run_round().unwrap();
    let entry = &report.individuals[owner.index()];
    assert_eq!(entry.search_investment, 0.25);
    assert_eq!(entry.sites_raised, 1);
    assert_eq!(report.sites[site.index()].owner_share, 0.75);
}

// ============================================================================
// Hand-built Worlds
// ============================================================================

fn hand_built(field: ResourceField, config: &SimulationConfig) -> (Environment, BeliefStore) {
    let world = WorldConfig {
        grid_size: field.size(),
        resource_level: config.world.resource_level,
        aggregation_level: config.world.aggregation_level,
    };
    let mut env = Environment::with_field(field, FieldGenerator::new(&world), config.search.search_efficiency);
    let mut beliefs = BeliefStore::new(config.belief.clone());
    for (i, (role, x, y)) in [(Role::Primary, 5, 5), (Role::Secondary, 6, 5), (Role::Secondary, 4, 5)]
        .into_iter()
        .enumerate()
    {
        let id = env
            .add_individual(Individual::new(AgentId(i as u32), role, GridPos::new(x, y)))
            .unwrap();
        beliefs.register(id, role);
    }
    env.create_site(Some(AgentId(0)), GridPos::new(5, 5)).unwrap();
    (env, beliefs)
}

#[test]
fn test_shared_site_extractions_deplete_in_sequence() {
    let mut config = small_config(9);
    config.world.grid_size = 11;
    config.population.primary_count = 1;
    config.population.secondary_count = 2;
    config.population.sites_per_secondary = 1;
    config.settlement.min_exploration_radius = 0.0;
    config.settlement.home_range_radius = 0.0;

    // Only the nest cell itself is reachable
    let mut cells = vec![0.0; 121];
    cells[5 * 11 + 5] = 10.0;
    let field = ResourceField::from_cells(11, cells).unwrap();
    let (env, beliefs) = hand_built(field, &config);
    let settlement = config.settlement.clone();

    let mut sim = Simulation::from_parts(config, env, beliefs, ChaCha8Rng::seed_from_u64(1)).unwrap();
    let report = sim.run_round().unwrap();

    // Three raise actions on one cell: 10 * (1 - 0.7^3)
    let raisers = report.individuals.iter().filter(|i| i.sites_raised > 0).count();
    assert_eq!(raisers, 3);
    let expected = 10.0 * (1.0 - 0.7f64.powi(3));
    assert!((report.total_extracted - expected).abs() < 1e-9);
    assert!((report.sites[0].accumulated_resources - expected).abs() < 1e-9);
    assert!((report.field_after.total - 10.0 * 0.7f64.powi(3)).abs() < 1e-9);

    // Marginal offspring takes a fourth bite from what the round left behind
    let fourth = 0.3 * 10.0 * 0.7f64.powi(3);
    let marginal = offspring(expected + fourth, &settlement) - offspring(expected, &settlement);
    assert!((report.sites[0].marginal_offspring - marginal).abs() < 1e-9);
}

#[test]
fn test_secondary_payoffs_split_offspring() {
    let mut config = small_config(10);
    config.world.grid_size = 11;
    config.population.primary_count = 1;
    config.population.secondary_count = 2;
    config.population.sites_per_secondary = 1;
    let (env, beliefs) = hand_built(ResourceField::uniform(11, 1.0), &config);

    let mut sim = Simulation::from_parts(config, env, beliefs, ChaCha8Rng::seed_from_u64(2)).unwrap();
    let report = sim.run_round().unwrap();

    let site = &report.sites[0];
    let total = site.owner_share + site.contributor_shares.values().sum::<f64>();
    for ind in report.individuals.iter().filter(|i| i.role == Role::Secondary) {
        let share = site.contributor_shares.get(&ind.agent).copied().unwrap_or(0.0);
        let expected = share / total * site.expected_offspring;
        assert!((ind.payoff - expected).abs() < 1e-9);
    }
}
