//! Environment store: the resource field plus the site and individual arenas
//!
//! All spatial and resource queries go through here. The field is only ever
//! mutated by `extract` (cell decrement) and `regenerate` (wholesale redraw).
//! Sites and individuals live in arenas indexed by their integer ids, so no
//! other component holds references across rounds.

use rand::Rng;

use crate::core::config::WorldConfig;
use crate::core::error::{Result, SimError};
use crate::core::types::{AgentId, GridPos, SiteId};
use crate::entity::individual::Individual;
use crate::world::field::{FieldGenerator, FieldSummary, ResourceField};
use crate::world::site::{Site, SiteSnapshot};

/// Probability that a paid search reveals a site's composition
///
/// `1 - exp(-λ · search / distance)`; a searcher standing on the site always
/// succeeds.
pub fn discovery_probability(distance: f64, search_investment: f64, efficiency: f64) -> f64 {
    if distance <= 0.0 {
        return 1.0;
    }
    let search = search_investment.max(0.0);
    1.0 - (-efficiency * search / distance).exp()
}

pub struct Environment {
    field: ResourceField,
    generator: FieldGenerator,
    /// λ for paid site queries
    search_efficiency: f64,
    sites: Vec<Site>,
    individuals: Vec<Individual>,
    /// Positions of every registered site, kept in step with `sites`
    nest_locations: Vec<GridPos>,
}

impl Environment {
    /// Environment over a freshly drawn field
    pub fn generate<R: Rng + ?Sized>(config: &WorldConfig, search_efficiency: f64, rng: &mut R) -> Self {
        let generator = FieldGenerator::new(config);
        let field = generator.generate(rng);
        Self::with_field(field, generator, search_efficiency)
    }

    /// Environment over a supplied field (regeneration still uses `generator`)
    pub fn with_field(field: ResourceField, generator: FieldGenerator, search_efficiency: f64) -> Self {
        Self {
            field,
            generator,
            search_efficiency,
            sites: Vec::new(),
            individuals: Vec::new(),
            nest_locations: Vec::new(),
        }
    }

    // === RESOURCE FIELD ===

    pub fn field(&self) -> &ResourceField {
        &self.field
    }

    pub fn grid_size(&self) -> usize {
        self.field.size()
    }

    pub fn field_summary(&self) -> FieldSummary {
        self.field.summary()
    }

    pub fn resource_at(&self, pos: GridPos) -> Result<f64> {
        self.field.get(pos)
    }

    /// Deduct `fraction × current` from a cell and return the deducted amount
    pub fn extract(&mut self, pos: GridPos, fraction: f64) -> Result<f64> {
        self.field.take_fraction(pos, fraction)
    }

    pub fn best_cell_within(&self, center: GridPos, radius: f64) -> Option<(GridPos, f64)> {
        self.field.best_cell_within(center, radius)
    }

    /// Redraw the whole field and clear every site's round accumulator
    pub fn regenerate<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.field = self.generator.generate(rng);
        self.clear_site_accumulators();
    }

    pub fn clear_site_accumulators(&mut self) {
        for site in &mut self.sites {
            site.reset_resources();
        }
    }

    // === SITES ===

    /// Register a new site and return its id
    pub fn create_site(&mut self, owner: Option<AgentId>, position: GridPos) -> Result<SiteId> {
        if !self.field.contains(position) {
            return Err(SimError::OutOfBounds { pos: position, size: self.grid_size() });
        }
        if let Some(owner) = owner {
            self.individual(owner)?;
        }

        let id = SiteId(self.sites.len() as u32);
        self.sites.push(Site::new(id, owner, position));
        self.nest_locations.push(position);

        if let Some(owner) = owner {
            self.individual_mut(owner)?.owned_sites.push(id);
        }
        Ok(id)
    }

    pub fn site(&self, id: SiteId) -> Result<&Site> {
        self.sites.get(id.index()).ok_or(SimError::UnknownSite(id))
    }

    pub fn site_mut(&mut self, id: SiteId) -> Result<&mut Site> {
        self.sites.get_mut(id.index()).ok_or(SimError::UnknownSite(id))
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn sites_mut(&mut self) -> &mut [Site] {
        &mut self.sites
    }

    /// Where every nest is; free, passive population-wide knowledge
    pub fn nest_locations(&self) -> &[GridPos] {
        &self.nest_locations
    }

    /// Paid, probabilistic look inside a site
    ///
    /// One Bernoulli trial per call against [`discovery_probability`]
    /// measured from the querying individual's position.
    pub fn query_site<R: Rng + ?Sized>(
        &self,
        agent: AgentId,
        site: SiteId,
        search_investment: f64,
        rng: &mut R,
    ) -> Result<Option<SiteSnapshot>> {
        let searcher = self.individual(agent)?;
        let target = self.site(site)?;

        let distance = searcher.position.distance(&target.position);
        if distance <= 0.0 {
            return Ok(Some(target.snapshot()));
        }

        let p = discovery_probability(distance, search_investment, self.search_efficiency);
        if rng.gen::<f64>() < p {
            Ok(Some(target.snapshot()))
        } else {
            Ok(None)
        }
    }

    // === INDIVIDUALS ===

    /// Register an individual; its id must equal the next arena slot
    pub fn add_individual(&mut self, individual: Individual) -> Result<AgentId> {
        let expected = AgentId(self.individuals.len() as u32);
        if individual.id != expected {
            return Err(SimError::InvalidConfig(format!(
                "individual {} registered out of order (expected {})",
                individual.id, expected
            )));
        }
        if !self.field.contains(individual.position) {
            return Err(SimError::OutOfBounds {
                pos: individual.position,
                size: self.grid_size(),
            });
        }
        self.individuals.push(individual);
        Ok(expected)
    }

    pub fn individual(&self, id: AgentId) -> Result<&Individual> {
        self.individuals.get(id.index()).ok_or(SimError::UnknownAgent(id))
    }

    pub fn individual_mut(&mut self, id: AgentId) -> Result<&mut Individual> {
        self.individuals.get_mut(id.index()).ok_or(SimError::UnknownAgent(id))
    }

    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    /// Ids of individuals within `radius` of `pos`; free spatial query
    pub fn agents_near(&self, pos: GridPos, radius: f64) -> Vec<AgentId> {
        self.individuals
            .iter()
            .filter(|ind| ind.position.distance(&pos) <= radius)
            .map(|ind| ind.id)
            .collect()
    }
}
