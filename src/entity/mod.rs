pub mod individual;

pub use individual::{Individual, BUDGET_TOLERANCE, ENERGY_BUDGET};
