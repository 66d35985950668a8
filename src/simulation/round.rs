//! Round coordinator - orchestrates one simulation round
//!
//! snapshot -> decide -> act (shuffled) -> reset
//!
//! Decide reads only the frozen snapshot and the beliefs, so it runs on rayon
//! for large populations. Act mutates the live environment strictly in the
//! shuffled order: later extractions see the depletion left by earlier ones.
//! A failure during Act leaves the world inconsistent, so it ends the run.

use std::sync::Arc;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::core::config::SimulationConfig;
use crate::core::error::{ensure_finite, Result, SimError};
use crate::core::types::{AgentId, Role, Round, SiteId};
use crate::entity::individual::{BUDGET_TOLERANCE, ENERGY_BUDGET};
use crate::simulation::belief::{BeliefStore, SearchObservation};
use crate::simulation::bootstrap::bootstrap;
use crate::simulation::output::{IndividualReport, MatingSystemStats, RoundReport, SimulationOutput, SiteReport};
use crate::simulation::settlement::{self, offspring_with_investment};
use crate::simulation::snapshot::RoundSnapshot;
use crate::simulation::strategy::{ContributorStrategy, Decision, DecisionContext, OwnerStrategy, Strategy};
use crate::world::environment::Environment;
use crate::world::field::FieldSummary;

/// One step of the Act phase
#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    /// Paid look inside a site
    Search { agent: AgentId, site: SiteId, investment: f64 },
    /// One extraction on behalf of a site
    Raise { agent: AgentId, site: SiteId },
}

#[derive(Debug, Default)]
struct ActTally {
    searches_attempted: usize,
    searches_succeeded: usize,
    total_extracted: f64,
}

pub struct Simulation {
    config: SimulationConfig,
    env: Environment,
    beliefs: BeliefStore,
    /// Bound decision logic, indexed by `AgentId`
    strategies: Vec<Arc<dyn Strategy>>,
    rng: ChaCha8Rng,
    round: Round,
    /// Round whose Act phase failed; nothing runs after it
    aborted_at: Option<Round>,
}

impl Simulation {
    /// Validate the configuration, bootstrap the world and bind the default
    /// strategies
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.run.seed);
        let (env, beliefs) = bootstrap(&config, &mut rng)?;
        Self::from_parts(config, env, beliefs, rng)
    }

    /// Wrap an already-built world; primaries get the owner strategy,
    /// secondaries the contributor strategy
    pub fn from_parts(
        config: SimulationConfig,
        env: Environment,
        beliefs: BeliefStore,
        rng: ChaCha8Rng,
    ) -> Result<Self> {
        config.validate()?;

        let owner: Arc<dyn Strategy> = Arc::new(OwnerStrategy::new(&config));
        let contributor: Arc<dyn Strategy> = Arc::new(ContributorStrategy::new(&config));
        let strategies = env
            .individuals()
            .iter()
            .map(|ind| match ind.role {
                Role::Primary => Arc::clone(&owner),
                Role::Secondary => Arc::clone(&contributor),
            })
            .collect();

        Ok(Self {
            config,
            env,
            beliefs,
            strategies,
            rng,
            round: 0,
            aborted_at: None,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn beliefs(&self) -> &BeliefStore {
        &self.beliefs
    }

    /// Next round to run
    pub fn round(&self) -> Round {
        self.round
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted_at.is_some()
    }

    /// Swap the decision logic of one individual, effective next round
    pub fn bind_strategy(&mut self, agent: AgentId, strategy: Arc<dyn Strategy>) -> Result<()> {
        let slot = self
            .strategies
            .get_mut(agent.index())
            .ok_or(SimError::UnknownAgent(agent))?;
        tracing::debug!(%agent, strategy = strategy.name(), "strategy bound");
        *slot = strategy;
        Ok(())
    }

    pub fn strategy_name(&self, agent: AgentId) -> Result<&'static str> {
        self.strategies
            .get(agent.index())
            .map(|s| s.name())
            .ok_or(SimError::UnknownAgent(agent))
    }

    /// Run `rounds` rounds and collect their reports
    pub fn run(&mut self, rounds: u32) -> Result<SimulationOutput> {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(rounds as usize);
        for _ in 0..rounds {
            reports.push(self.run_round()?);
        }
        Ok(SimulationOutput::new(reports, start.elapsed()))
    }

    /// Execute one full round and report on it
    pub fn run_round(&mut self) -> Result<RoundReport> {
        if let Some(round) = self.aborted_at {
            return Err(SimError::RunAborted { round });
        }
        let round = self.round;
        tracing::info!(round, "round start");

        let established = self.establish_missing_sites();
        self.fatal_on_error(round, established)?;

        // 1. Snapshot
        let snapshot = RoundSnapshot::capture(round, &self.env);

        // 2. Decide (nothing live is touched, so errors here are recoverable)
        let decisions = self.decide(&snapshot)?;

        // 3. Act
        let acted = self.act(round, &snapshot, &decisions);
        let report = self.fatal_on_error(round, acted)?;

        // 4. Reset
        self.reset();
        self.round += 1;

        tracing::info!(
            round,
            extracted = report.total_extracted,
            searches = report.searches_attempted,
            found = report.searches_succeeded,
            "round complete"
        );
        Ok(report)
    }

    fn fatal_on_error<T>(&mut self, round: Round, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            tracing::error!(round, error = %err, "round failed, aborting run");
            self.aborted_at = Some(round);
        }
        result
    }

    /// Give every site-less primary a nest where it stands
    fn establish_missing_sites(&mut self) -> Result<()> {
        if !self.config.population.establish_when_empty {
            return Ok(());
        }
        let homeless: Vec<_> = self
            .env
            .individuals()
            .iter()
            .filter(|ind| ind.is_primary() && ind.owned_sites.is_empty())
            .map(|ind| (ind.id, ind.position))
            .collect();

        for (agent, position) in homeless {
            let site = self.env.create_site(Some(agent), position)?;
            tracing::info!(%agent, %site, %position, "site established");
        }
        Ok(())
    }

    // === DECIDE ===

    fn decide(&self, snapshot: &RoundSnapshot) -> Result<Vec<Decision>> {
        let contexts: Vec<DecisionContext> = self
            .env
            .individuals()
            .iter()
            .map(DecisionContext::from_individual)
            .collect();

        let decide_one = |ctx: &DecisionContext| -> Result<Decision> {
            let strategy = self
                .strategies
                .get(ctx.agent.index())
                .ok_or(SimError::UnknownAgent(ctx.agent))?;
            let decision = strategy.decide(ctx, snapshot, &self.beliefs)?;
            check_budget(ctx.agent, &decision)?;
            Ok(decision)
        };

        if contexts.len() >= self.config.run.parallel_threshold {
            contexts.par_iter().map(decide_one).collect()
        } else {
            contexts.iter().map(decide_one).collect()
        }
    }

    // === ACT ===

    fn act(&mut self, round: Round, snapshot: &RoundSnapshot, decisions: &[Decision]) -> Result<RoundReport> {
        self.commit(decisions)?;

        let mut actions = self.build_actions(snapshot)?;
        actions.shuffle(&mut self.rng);

        let mut tally = ActTally::default();
        for action in actions {
            self.execute(action, &mut tally)?;
        }

        for site in self.env.sites_mut() {
            settlement::settle_site(site, &self.config.settlement)?;
        }
        let payoffs = self.payoffs()?;
        self.submit_cohorts(&payoffs)?;

        self.build_report(round, snapshot.field_summary, &payoffs, tally)
    }

    /// Write cached decisions into individuals and the site registry
    fn commit(&mut self, decisions: &[Decision]) -> Result<()> {
        let was_tended: Vec<bool> = self.env.sites().iter().map(|s| !s.is_vacant()).collect();
        for site in self.env.sites_mut() {
            site.clear_investments();
        }

        for (i, decision) in decisions.iter().enumerate() {
            let agent = AgentId(i as u32);
            for (&site_id, &share) in &decision.raise_investments {
                if share <= 0.0 {
                    continue;
                }
                let site = self.env.site_mut(site_id)?;
                if site.owner == Some(agent) {
                    site.set_owner_share(share);
                } else {
                    site.set_contributor_share(agent, share);
                }
            }
            self.env
                .individual_mut(agent)?
                .set_investments(decision.search_investment, &decision.raise_investments);
        }

        for (site, tended) in self.env.sites().iter().zip(was_tended) {
            if tended && site.is_vacant() {
                tracing::warn!(site = %site.id, "site vacated");
            }
        }
        Ok(())
    }

    /// One raise per positive (individual, site) pair, plus a search of that
    /// site when the individual searches at all; searchers with nothing to
    /// raise look at the nearest nest instead
    fn build_actions(&self, snapshot: &RoundSnapshot) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        for ind in self.env.individuals() {
            let searching = ind.search_investment > 0.0;
            let mut raised = false;
            for (site, _) in ind.active_sites() {
                raised = true;
                actions.push(Action::Raise { agent: ind.id, site });
                if searching {
                    actions.push(Action::Search {
                        agent: ind.id,
                        site,
                        investment: ind.search_investment,
                    });
                }
            }
            if !raised && searching {
                if let Some(site) = snapshot.nearest_site(snapshot.position(ind.id)?) {
                    actions.push(Action::Search {
                        agent: ind.id,
                        site,
                        investment: ind.search_investment,
                    });
                }
            }
        }
        Ok(actions)
    }

    fn execute(&mut self, action: Action, tally: &mut ActTally) -> Result<()> {
        match action {
            Action::Search { agent, site, investment } => {
                tally.searches_attempted += 1;
                match self.env.query_site(agent, site, investment, &mut self.rng)? {
                    Some(found) => {
                        tally.searches_succeeded += 1;
                        tracing::trace!(%agent, %site, "search succeeded");
                        for (occupant, share) in found.occupants() {
                            if share > 0.0 {
                                self.beliefs.submit_raising_observation(site, occupant, share)?;
                            }
                        }
                    }
                    None => tracing::trace!(%agent, %site, "search failed"),
                }
            }
            Action::Raise { site, .. } => {
                tally.total_extracted += settlement::extract(&mut self.env, site, &self.config.settlement)?;
            }
        }
        Ok(())
    }

    /// Payoff of every individual, indexed by `AgentId`
    fn payoffs(&self) -> Result<Vec<f64>> {
        self.env
            .individuals()
            .iter()
            .map(|ind| match ind.role {
                Role::Primary => settlement::payoff_primary(&self.env, ind.id, &self.config.settlement),
                Role::Secondary => settlement::payoff_secondary(&self.env, ind.id, &self.config.settlement),
            })
            .collect()
    }

    /// Each individual observes same-role peers within its observation radius
    fn submit_cohorts(&mut self, payoffs: &[f64]) -> Result<()> {
        let radius = self.config.search.observation_radius;
        for ind in self.env.individuals() {
            let cohort: Vec<SearchObservation> = self
                .env
                .agents_near(ind.position, radius)
                .into_iter()
                .filter(|peer| *peer != ind.id)
                .filter_map(|peer| self.env.individual(peer).ok())
                .filter(|peer| peer.role == ind.role)
                .map(|peer| SearchObservation {
                    search_investment: peer.search_investment,
                    payoff: payoffs.get(peer.id.index()).copied().unwrap_or(0.0),
                })
                .collect();
            if !cohort.is_empty() {
                self.beliefs.submit_search_observation(ind.id, &cohort)?;
            }
        }
        Ok(())
    }

    fn build_report(
        &self,
        round: Round,
        field_before: FieldSummary,
        payoffs: &[f64],
        tally: ActTally,
    ) -> Result<RoundReport> {
        let settlement = &self.config.settlement;

        let mut sites = Vec::with_capacity(self.env.sites().len());
        for site in self.env.sites() {
            // Post-round field, shares unchanged
            let after_next_extraction = offspring_with_investment(
                &site.snapshot(),
                self.env.field(),
                site.total_investment(),
                settlement,
            );
            let marginal = ensure_finite(after_next_extraction - site.expected_offspring, || {
                format!("marginal offspring at {}", site.id)
            })?;
            sites.push(SiteReport {
                site: site.id,
                owner: site.owner,
                owner_share: site.owner_share(),
                contributor_shares: site.contributor_shares().clone(),
                accumulated_resources: site.accumulated_resources(),
                expected_offspring: site.expected_offspring,
                marginal_offspring: marginal,
            });
        }

        let individuals = self
            .env
            .individuals()
            .iter()
            .zip(payoffs)
            .map(|(ind, payoff)| IndividualReport {
                agent: ind.id,
                role: ind.role,
                search_investment: ind.search_investment,
                raise_total: ind.total_raise(),
                sites_raised: ind.active_sites().count(),
                payoff: *payoff,
            })
            .collect();

        Ok(RoundReport {
            round,
            field_before,
            field_after: self.env.field_summary(),
            sites,
            individuals,
            searches_attempted: tally.searches_attempted,
            searches_succeeded: tally.searches_succeeded,
            total_extracted: ensure_finite(tally.total_extracted, || "total extraction".into())?,
            mating: MatingSystemStats::from_sites(self.env.sites()),
        })
    }

    // === RESET ===

    /// Fold the round's observations into beliefs, then redraw the field
    /// (which also empties every site accumulator)
    fn reset(&mut self) {
        self.beliefs.update_beliefs();
        self.env.regenerate(&mut self.rng);
    }
}

fn check_budget(agent: AgentId, decision: &Decision) -> Result<()> {
    let total = ensure_finite(decision.total(), || format!("budget of {}", agent))?;
    let in_range = (0.0..=ENERGY_BUDGET).contains(&decision.search_investment)
        && decision.raise_investments.values().all(|v| *v >= 0.0);
    if !in_range || (total - ENERGY_BUDGET).abs() > BUDGET_TOLERANCE {
        return Err(SimError::NumericalAnomaly(format!(
            "{} split {} between search and raising, expected {}",
            agent, total, ENERGY_BUDGET
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::strategy::FixedStrategy;
    use std::collections::BTreeMap;

    fn small_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.world.grid_size = 40;
        config.population.primary_count = 4;
        config.population.secondary_count = 6;
        config.population.nest_radius = 8.0;
        config.search.observation_radius = 60.0;
        config.search.candidate_radius = 60.0;
        config
    }

    fn fixed(search: f64, raise: &[(u32, f64)]) -> Arc<dyn Strategy> {
        Arc::new(FixedStrategy {
            decision: Decision {
                search_investment: search,
                raise_investments: raise.iter().map(|(s, v)| (SiteId(*s), *v)).collect::<BTreeMap<_, _>>(),
            },
        })
    }

    #[test]
    fn test_round_advances_and_reports() {
        let mut sim = Simulation::new(small_config()).unwrap();
        let report = sim.run_round().unwrap();

        assert_eq!(report.round, 0);
        assert_eq!(sim.round(), 1);
        assert_eq!(report.individuals.len(), 10);
        assert_eq!(report.sites.len(), 8);
        assert!(report.total_extracted > 0.0);
        assert!(report.searches_attempted > 0);

        // Everything extracted left the field
        assert!((report.field_before.total - 40.0 * 40.0).abs() < 1e-6);
        let depleted = report.field_before.total - report.field_after.total;
        assert!((depleted - report.total_extracted).abs() < 1e-6);
    }

    #[test]
    fn test_budget_invariant_after_commit() {
        let mut sim = Simulation::new(small_config()).unwrap();
        for _ in 0..3 {
            sim.run_round().unwrap();
            assert!(sim.environment().individuals().iter().all(|i| i.budget_balanced()));
        }
    }

    #[test]
    fn test_accumulators_cleared_between_rounds() {
        let mut sim = Simulation::new(small_config()).unwrap();
        let report = sim.run_round().unwrap();
        assert!(report.sites.iter().any(|s| s.accumulated_resources > 0.0));
        assert!(sim.environment().sites().iter().all(|s| s.accumulated_resources() == 0.0));
    }

    #[test]
    fn test_unbalanced_decision_is_recoverable() {
        let mut sim = Simulation::new(small_config()).unwrap();
        sim.bind_strategy(AgentId(0), fixed(0.2, &[(0, 0.3)])).unwrap();
        assert!(matches!(sim.run_round(), Err(SimError::NumericalAnomaly(_))));
        assert!(!sim.is_aborted());
        assert_eq!(sim.round(), 0);

        sim.bind_strategy(AgentId(0), fixed(1.0, &[])).unwrap();
        assert!(sim.run_round().is_ok());
    }

    #[test]
    fn test_act_failure_aborts_run() {
        let mut sim = Simulation::new(small_config()).unwrap();
        sim.bind_strategy(AgentId(0), fixed(0.5, &[(999, 0.5)])).unwrap();
        assert!(matches!(sim.run_round(), Err(SimError::UnknownSite(_))));
        assert!(sim.is_aborted());
        assert!(matches!(sim.run_round(), Err(SimError::RunAborted { round: 0 })));
    }

    #[test]
    fn test_strategy_swap_takes_effect() {
        let mut sim = Simulation::new(small_config()).unwrap();
        let secondary = AgentId(4);
        assert_eq!(sim.strategy_name(secondary).unwrap(), "contributor");

        sim.bind_strategy(secondary, fixed(1.0, &[])).unwrap();
        assert_eq!(sim.strategy_name(secondary).unwrap(), "fixed");
        let report = sim.run_round().unwrap();

        let entry = &report.individuals[secondary.index()];
        assert_eq!(entry.search_investment, 1.0);
        assert_eq!(entry.sites_raised, 0);
        assert!(report.sites.iter().all(|s| !s.contributor_shares.contains_key(&secondary)));
        assert!(sim.bind_strategy(AgentId(99), fixed(1.0, &[])).is_err());
    }

    #[test]
    fn test_parallel_and_sequential_decide_agree() {
        let mut sequential = small_config();
        sequential.run.parallel_threshold = usize::MAX;
        let mut parallel = small_config();
        parallel.run.parallel_threshold = 0;

        let a = Simulation::new(sequential).unwrap().run(3).unwrap();
        let b = Simulation::new(parallel).unwrap().run(3).unwrap();
        assert_eq!(a.rounds, b.rounds);
    }

    #[test]
    fn test_primary_without_site_establishes_one() {
        let mut config = small_config();
        config.population.sites_per_primary = 0;
        config.population.secondary_count = 0;
        let mut sim = Simulation::new(config).unwrap();
        assert!(sim.environment().sites().is_empty());

        sim.run_round().unwrap();
        let env = sim.environment();
        assert_eq!(env.sites().len(), 4);
        for ind in env.individuals() {
            assert_eq!(env.site(ind.owned_sites[0]).unwrap().position, ind.position);
        }
    }
}
