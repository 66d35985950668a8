//! Allocation optimizer: turns a raising budget into a per-site investment
//!
//! Discretized greedy marginal-utility ascent. The budget is cut into `N`
//! equal steps; each step goes to the site whose payoff rises fastest at its
//! current allocation (finite difference with probe Δ). The result is a
//! bounded-quality approximation of
//! `max Σ payoff(site, r_site) s.t. Σ r_site = budget, r_site >= 0`.
//!
//! Keeping `budget / N` small is the caller's job; coarse steps only degrade
//! the approximation.

use std::collections::BTreeMap;

use crate::core::config::AllocationConfig;
use crate::core::error::{Result, SimError};
use crate::core::types::SiteId;

/// Step count and probe for one optimizer call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocationParams {
    pub steps: u32,
    pub probe: f64,
}

impl From<&AllocationConfig> for AllocationParams {
    fn from(config: &AllocationConfig) -> Self {
        Self {
            steps: config.steps,
            probe: config.probe,
        }
    }
}

/// Split `budget` across `sites`
///
/// `belief_lookup(site)` gives the believed investment by everyone else;
/// `payoff_fn(site, own, others)` gives the expected reproductive output at
/// that site for the given own and third-party investment.
///
/// Output sums to `budget` (after a final rescale), is never negative, and
/// is identical for identical inputs. Ties go to the lowest site id.
pub fn allocate<B, P>(
    budget: f64,
    sites: &[SiteId],
    belief_lookup: B,
    payoff_fn: P,
    params: AllocationParams,
) -> Result<BTreeMap<SiteId, f64>>
where
    B: Fn(SiteId) -> f64,
    P: Fn(SiteId, f64, f64) -> f64,
{
    if !(budget >= 0.0) || !budget.is_finite() {
        return Err(SimError::InvalidBudget(budget));
    }

    // Ascending ids make the strict comparison below break ties low
    let mut candidates: Vec<SiteId> = sites.to_vec();
    candidates.sort_unstable();
    candidates.dedup();

    let mut allocation: BTreeMap<SiteId, f64> = candidates.iter().map(|s| (*s, 0.0)).collect();
    if budget == 0.0 {
        return Ok(allocation);
    }
    if candidates.is_empty() {
        return Err(SimError::NoCandidateSites);
    }

    let steps = params.steps.max(1);
    let step = budget / steps as f64;
    let probe = params.probe;
    let others: Vec<f64> = candidates.iter().map(|s| belief_lookup(*s)).collect();

    for _ in 0..steps {
        let mut best: Option<(usize, f64)> = None;
        for (i, site) in candidates.iter().enumerate() {
            let current = allocation[site];
            let here = payoff_fn(*site, current, others[i]);
            let ahead = payoff_fn(*site, current + probe, others[i]);
            let marginal = (ahead - here) / probe;
            if !marginal.is_finite() {
                return Err(SimError::NumericalAnomaly(format!(
                    "marginal utility at {} is {}",
                    site, marginal
                )));
            }
            if best.map_or(true, |(_, b)| marginal > b) {
                best = Some((i, marginal));
            }
        }
        if let Some((i, _)) = best {
            if let Some(share) = allocation.get_mut(&candidates[i]) {
                *share += step;
            }
        }
    }

    let total: f64 = allocation.values().sum();
    if total > 0.0 {
        let scale = budget / total;
        for share in allocation.values_mut() {
            *share *= scale;
        }
    }

    Ok(allocation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> AllocationParams {
        AllocationParams { steps: 20, probe: 0.001 }
    }

    fn ids(n: u32) -> Vec<SiteId> {
        (0..n).map(SiteId).collect()
    }

    #[test]
    fn test_identical_concave_sites_split_evenly() {
        let alloc = allocate(1.0, &ids(2), |_| 0.0, |_, own, _| own.sqrt(), params()).unwrap();
        let step = 1.0 / 20.0;
        assert!((alloc[&SiteId(0)] - 0.5).abs() <= step);
        assert!((alloc[&SiteId(1)] - 0.5).abs() <= step);
    }

    #[test]
    fn test_zero_budget_is_all_zero() {
        let alloc = allocate(0.0, &ids(4), |_| 0.0, |_, own, _| own, params()).unwrap();
        assert_eq!(alloc.len(), 4);
        assert!(alloc.values().all(|v| *v == 0.0));

        let empty = allocate(0.0, &[], |_| 0.0, |_, own, _| own, params()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_preconditions() {
        assert!(matches!(
            allocate(-0.1, &ids(1), |_| 0.0, |_, o, _| o, params()),
            Err(SimError::InvalidBudget(_))
        ));
        assert!(matches!(
            allocate(f64::NAN, &ids(1), |_| 0.0, |_, o, _| o, params()),
            Err(SimError::InvalidBudget(_))
        ));
        assert!(matches!(
            allocate(0.5, &[], |_| 0.0, |_, o, _| o, params()),
            Err(SimError::NoCandidateSites)
        ));
    }

    #[test]
    fn test_flat_payoff_goes_to_lowest_id() {
        let sites = [SiteId(7), SiteId(3), SiteId(5)];
        let alloc = allocate(0.8, &sites, |_| 0.0, |_, _, _| 1.0, params()).unwrap();
        assert!((alloc[&SiteId(3)] - 0.8).abs() < 1e-12);
        assert_eq!(alloc[&SiteId(5)], 0.0);
        assert_eq!(alloc[&SiteId(7)], 0.0);
    }

    #[test]
    fn test_better_site_gets_more() {
        // Site 1 pays twice as much per unit, both with diminishing returns
        let payoff = |site: SiteId, own: f64, _| {
            let weight = if site == SiteId(1) { 2.0 } else { 1.0 };
            weight * own.sqrt()
        };
        let alloc = allocate(1.0, &ids(2), |_| 0.0, payoff, params()).unwrap();
        assert!(alloc[&SiteId(1)] > alloc[&SiteId(0)]);
    }

    #[test]
    fn test_belief_feeds_payoff() {
        // Crowded site (others already invest a lot) is less attractive
        let beliefs = |site: SiteId| if site == SiteId(0) { 5.0 } else { 0.0 };
        let payoff = |_, own: f64, others: f64| own / (own + others + 0.1);
        let alloc = allocate(1.0, &ids(2), beliefs, payoff, params()).unwrap();
        assert!(alloc[&SiteId(1)] > alloc[&SiteId(0)]);
    }

    #[test]
    fn test_sum_matches_budget() {
        let alloc = allocate(0.37, &ids(5), |s| s.0 as f64 * 0.1, |_, own, o| (own + o).ln_1p(), params())
            .unwrap();
        let total: f64 = alloc.values().sum();
        assert!((total - 0.37).abs() < 1e-9);
        assert!(alloc.values().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_non_finite_payoff_is_reported() {
        let result = allocate(1.0, &ids(1), |_| 0.0, |_, _, _| f64::NAN, params());
        assert!(matches!(result, Err(SimError::NumericalAnomaly(_))));
    }

    #[test]
    fn test_deterministic() {
        let run = || allocate(1.0, &ids(3), |_| 0.2, |s, own, o| ((s.0 + 1) as f64 * own + o).sqrt(), params());
        assert_eq!(run().unwrap(), run().unwrap());
    }
}
