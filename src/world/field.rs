//! Resource field: a dense square grid of non-negative resource values
//!
//! The field is redrawn every round from an over-dispersed (negative
//! binomial) distribution and renormalized so the total mass equals the
//! grid area. Raise actions deplete individual cells in between.

use rand::Rng;
use rand_distr::{Distribution, Gamma, Poisson};
use serde::{Deserialize, Serialize};

use crate::core::config::WorldConfig;
use crate::core::error::{Result, SimError};
use crate::core::types::GridPos;

/// Dense row-major resource grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceField {
    size: usize,
    cells: Vec<f64>,
}

/// Aggregate view of a field, cheap to copy into snapshots and reports
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub total: f64,
    pub mean: f64,
    pub max: f64,
    pub empty_cells: usize,
}

impl ResourceField {
    /// Field with every cell set to `value`
    pub fn uniform(size: usize, value: f64) -> Self {
        Self {
            size,
            cells: vec![value; size * size],
        }
    }

    /// Build a field from row-major values; `cells.len()` must be `size²`
    pub fn from_cells(size: usize, cells: Vec<f64>) -> Result<Self> {
        if cells.len() != size * size {
            return Err(SimError::InvalidConfig(format!(
                "field of size {} needs {} cells, got {}",
                size,
                size * size,
                cells.len()
            )));
        }
        if let Some(bad) = cells.iter().find(|v| !(**v >= 0.0) || !v.is_finite()) {
            return Err(SimError::InvalidConfig(format!(
                "field cells must be finite and non-negative, got {}",
                bad
            )));
        }
        Ok(Self { size, cells })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn contains(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.size && (pos.y as usize) < self.size
    }

    #[inline]
    fn index(&self, pos: GridPos) -> Result<usize> {
        if self.contains(pos) {
            Ok(pos.y as usize * self.size + pos.x as usize)
        } else {
            Err(SimError::OutOfBounds { pos, size: self.size })
        }
    }

    pub fn get(&self, pos: GridPos) -> Result<f64> {
        Ok(self.cells[self.index(pos)?])
    }

    /// Remove `fraction` of the cell's current value, returning the amount taken
    pub fn take_fraction(&mut self, pos: GridPos, fraction: f64) -> Result<f64> {
        let idx = self.index(pos)?;
        if fraction == 0.0 {
            return Ok(0.0);
        }
        let taken = self.cells[idx] * fraction;
        self.cells[idx] -= taken;
        Ok(taken)
    }

    /// In-grid cells within `radius` of `center` (`dx² + dy² <= radius²`),
    /// in row-major order
    pub fn cells_within(&self, center: GridPos, radius: f64) -> impl Iterator<Item = GridPos> + '_ {
        let reach = radius.max(0.0).floor() as i64;
        let r2 = radius * radius;
        (-reach..=reach).flat_map(move |dy| {
            (-reach..=reach).filter_map(move |dx| {
                let pos = center.offset(dx, dy);
                let d2 = (dx * dx + dy * dy) as f64;
                (d2 <= r2 && self.contains(pos)).then_some(pos)
            })
        })
    }

    /// Richest strictly-positive cell within `radius` of `center`
    ///
    /// Ties keep the first cell in row-major scan order.
    pub fn best_cell_within(&self, center: GridPos, radius: f64) -> Option<(GridPos, f64)> {
        let mut best: Option<(GridPos, f64)> = None;
        for pos in self.cells_within(center, radius) {
            let value = self.cells[pos.y as usize * self.size + pos.x as usize];
            if value > best.map_or(0.0, |(_, v)| v) {
                best = Some((pos, value));
            }
        }
        best
    }

    pub fn total(&self) -> f64 {
        self.cells.iter().sum()
    }

    pub fn summary(&self) -> FieldSummary {
        let total = self.total();
        let max = self.cells.iter().copied().fold(0.0, f64::max);
        let empty_cells = self.cells.iter().filter(|v| **v <= 0.0).count();
        let n = self.cells.len().max(1) as f64;
        FieldSummary {
            total,
            mean: total / n,
            max,
            empty_cells,
        }
    }
}

/// Draws fresh resource fields from the configured distribution
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGenerator {
    grid_size: usize,
    /// Negative binomial shape (successes)
    n: f64,
    /// Negative binomial success probability
    p: f64,
    /// Scale of the Gamma mixing distribution, `(1 - p) / p`
    scale: f64,
}

impl FieldGenerator {
    pub fn new(config: &WorldConfig) -> Self {
        let n = if config.aggregation_level > 0.0 {
            (10.0 / config.aggregation_level).floor().max(1.0)
        } else {
            100.0
        };
        let p = n / (n + config.resource_level);
        Self {
            grid_size: config.grid_size,
            n,
            p,
            scale: config.resource_level / n,
        }
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Negative binomial shape and probability actually used
    pub fn parameters(&self) -> (f64, f64) {
        (self.n, self.p)
    }

    /// Draw a new field normalized to `grid_size²` total mass
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> ResourceField {
        let count = self.grid_size * self.grid_size;
        let raw: Vec<f64> = match self.mixing() {
            Some(gamma) => (0..count).map(|_| sample(&gamma, rng)).collect(),
            None => vec![0.0; count],
        };
        let sum: f64 = raw.iter().sum();

        if !(sum > 0.0) {
            // Nothing drawn anywhere: keep the mass, lose the structure
            return ResourceField::uniform(self.grid_size, 1.0);
        }

        let scale = count as f64 / sum;
        ResourceField {
            size: self.grid_size,
            cells: raw.into_iter().map(|k| k * scale).collect(),
        }
    }

    /// Gamma rate distribution, or `None` when every draw would be zero
    fn mixing(&self) -> Option<Gamma<f64>> {
        if self.p >= 1.0 || !(self.scale > 0.0) {
            return None;
        }
        Gamma::new(self.n, self.scale).ok()
    }
}

/// One negative binomial draw as a Gamma-Poisson mixture; cost does not grow
/// with the shape
fn sample<R: Rng + ?Sized>(gamma: &Gamma<f64>, rng: &mut R) -> f64 {
    let rate = gamma.sample(rng);
    // Poisson rejects a zero rate, whose draw is 0 anyway
    Poisson::new(rate).map_or(0.0, |poisson| poisson.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn world(size: usize, level: f64, aggregation: f64) -> WorldConfig {
        WorldConfig {
            grid_size: size,
            resource_level: level,
            aggregation_level: aggregation,
        }
    }

    #[test]
    fn test_generated_mass_matches_area() {
        let generator = FieldGenerator::new(&world(40, 0.5, 0.3));
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let field = generator.generate(&mut rng);
        assert_eq!(field.size(), 40);
        assert!((field.total() - 1600.0).abs() < 1e-6);
        assert!(field.cells.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_generator_parameters() {
        let (n, p) = FieldGenerator::new(&world(10, 0.5, 0.3)).parameters();
        assert_eq!(n, 33.0);
        assert!((p - 33.0 / 33.5).abs() < 1e-12);

        let (n, _) = FieldGenerator::new(&world(10, 0.5, 0.0)).parameters();
        assert_eq!(n, 100.0);

        let (n, _) = FieldGenerator::new(&world(10, 0.5, 1.0)).parameters();
        assert_eq!(n, 10.0);

        // Tiny aggregation keeps the full shape instead of saturating
        let (n, _) = FieldGenerator::new(&world(10, 0.5, 1e-12)).parameters();
        assert!(n > u32::MAX as f64);
    }

    #[test]
    fn test_low_aggregation_generates_quickly() {
        let generator = FieldGenerator::new(&world(100, 0.5, 0.001));
        assert!(generator.parameters().0 >= 9_999.0);

        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let start = std::time::Instant::now();
        let field = generator.generate(&mut rng);
        assert!(start.elapsed() < std::time::Duration::from_secs(2));
        assert!((field.total() - 10_000.0).abs() < 1e-6);
        assert!(field.cells.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_zero_resource_level_gives_uniform_field() {
        let generator = FieldGenerator::new(&world(8, 0.0, 0.5));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let field = generator.generate(&mut rng);
        assert_eq!(field, ResourceField::uniform(8, 1.0));
    }

    #[test]
    fn test_same_seed_same_field() {
        let generator = FieldGenerator::new(&world(20, 0.5, 0.3));
        let a = generator.generate(&mut ChaCha8Rng::seed_from_u64(99));
        let b = generator.generate(&mut ChaCha8Rng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn test_sparse_level_leaves_empty_cells() {
        // Mean 0.5 per cell: most draws are zero, the rest carry the mass
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let field = FieldGenerator::new(&world(60, 0.5, 1.0)).generate(&mut rng);
        let summary = field.summary();
        assert!(summary.empty_cells > 3600 / 4);
        assert!(summary.max > summary.mean);
    }

    #[test]
    fn test_take_fraction() {
        let mut field = ResourceField::uniform(3, 10.0);
        let pos = GridPos::new(1, 1);
        let taken = field.take_fraction(pos, 0.3).unwrap();
        assert_eq!(taken, 3.0);
        assert_eq!(field.get(pos).unwrap(), 7.0);
        assert_eq!(field.take_fraction(pos, 0.0).unwrap(), 0.0);
        assert_eq!(field.get(pos).unwrap(), 7.0);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut field = ResourceField::uniform(3, 1.0);
        assert!(matches!(
            field.get(GridPos::new(3, 0)),
            Err(SimError::OutOfBounds { .. })
        ));
        assert!(field.take_fraction(GridPos::new(-1, 0), 0.5).is_err());
    }

    #[test]
    fn test_cells_within_radius() {
        let field = ResourceField::uniform(100, 1.0);
        // Radius 1 disc: center plus four neighbours
        assert_eq!(field.cells_within(GridPos::new(50, 50), 1.0).count(), 5);
        // Radius 3 disc has 29 lattice points
        assert_eq!(field.cells_within(GridPos::new(50, 50), 3.0).count(), 29);
        // Clipped at the corner
        assert_eq!(field.cells_within(GridPos::new(0, 0), 1.0).count(), 3);
    }

    #[test]
    fn test_best_cell_within() {
        let mut cells = vec![0.0; 25];
        cells[2 * 5 + 3] = 4.0;
        cells[4 * 5 + 4] = 9.0;
        let field = ResourceField::from_cells(5, cells).unwrap();

        let (pos, value) = field.best_cell_within(GridPos::new(2, 2), 1.0).unwrap();
        assert_eq!(pos, GridPos::new(3, 2));
        assert_eq!(value, 4.0);

        let (pos, _) = field.best_cell_within(GridPos::new(2, 2), 3.0).unwrap();
        assert_eq!(pos, GridPos::new(4, 4));

        assert!(field.best_cell_within(GridPos::new(0, 0), 1.0).is_none());
    }

    #[test]
    fn test_from_cells_rejects_bad_input() {
        assert!(ResourceField::from_cells(2, vec![1.0; 3]).is_err());
        assert!(ResourceField::from_cells(2, vec![1.0, -1.0, 0.0, 0.0]).is_err());
    }
}
