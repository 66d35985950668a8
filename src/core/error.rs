use thiserror::Error;

use crate::core::types::{AgentId, GridPos, Round, SiteId};

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Position {pos} outside {size}x{size} grid")]
    OutOfBounds { pos: GridPos, size: usize },

    #[error("Invalid budget: {0}")]
    InvalidBudget(f64),

    #[error("No candidate sites for a positive budget")]
    NoCandidateSites,

    #[error("Site not found: {0}")]
    UnknownSite(SiteId),

    #[error("Agent not found: {0}")]
    UnknownAgent(AgentId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Numerical anomaly: {0}")]
    NumericalAnomaly(String),

    #[error("Run aborted after failure in round {round}")]
    RunAborted { round: Round },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Config render error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;

/// Reject NaN and infinities with a `NumericalAnomaly` naming the quantity
pub fn ensure_finite(value: f64, what: impl FnOnce() -> String) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SimError::NumericalAnomaly(format!("{} is {}", what(), value)))
    }
}
