// Declare modules at the root level
pub mod config;
pub mod domain;
pub mod error;
pub mod features;
pub mod grid_risk;
pub mod history_cleanup;
pub mod id_generator;
pub mod idempotency;
pub mod model;
pub mod paths;
pub mod pipeline;
pub mod sensor_validation;
pub mod store;
pub mod time;
pub mod validators;
pub mod weather;

// Test utilities module (available in test and integration test builds)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export everything under a shared namespace for external access
pub mod shared {
    pub use super::config;
    pub use super::domain;
    pub use super::error;
    pub use super::features;
    pub use super::grid_risk;
    pub use super::history_cleanup;
    pub use super::id_generator;
    pub use super::idempotency;
    pub use super::model;
    pub use super::paths;
    pub use super::pipeline;
    pub use super::sensor_validation;
    pub use super::store;
    pub use super::time;
    pub use super::validators;
    pub use super::weather;
}

// Also re-export at root for convenience
pub use config::*;
pub use domain::*;
pub use error::*;
pub use features::*;
pub use grid_risk::*;
pub use history_cleanup::*;
pub use id_generator::*;
pub use idempotency::*;
pub use model::*;
pub use paths::*;
pub use pipeline::*;
pub use sensor_validation::*;
pub use store::*;
pub use time::*;
pub use validators::*;
pub use weather::*;
