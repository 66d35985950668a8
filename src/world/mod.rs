//! Resource field, nest sites and the environment store that owns them

pub mod environment;
pub mod field;
pub mod site;

pub use environment::{discovery_probability, Environment};
pub use field::{FieldGenerator, FieldSummary, ResourceField};
pub use site::{Site, SiteSnapshot};
