//! Core type definitions used throughout the codebase

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Unique identifier for individuals, doubles as the index into the
/// environment's individual arena
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "agent#{}", _0)]
pub struct AgentId(pub u32);

impl AgentId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Unique identifier for sites (nests), doubles as the index into the
/// environment's site arena
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "site#{}", _0)]
pub struct SiteId(pub u32);

impl SiteId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Simulation round counter
pub type Round = u32;

/// Integer grid coordinate
///
/// Signed so that positions outside the grid can be expressed and rejected
/// with `OutOfBounds` instead of wrapping.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display(fmt = "({}, {})", x, y)]
pub struct GridPos {
    pub x: i64,
    pub y: i64,
}

impl GridPos {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance between two cells
    pub fn distance(&self, other: &Self) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, dx: i64, dy: i64) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }
}

/// Role of an individual
///
/// Primaries own sites (female analogue); secondaries contribute to sites
/// they do not own (male analogue).
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Primary,
    Secondary,
}
