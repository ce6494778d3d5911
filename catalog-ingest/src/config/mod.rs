//! Configuration and dependency wiring.

mod dependencies;
mod settings;

pub use dependencies::{ConnectionMode, Dependencies};
pub use settings::IngestConfig;
