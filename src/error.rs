//! Error types for watchface health
//!
//! Aggregation itself never fails; missing data is skipped. These errors cover
//! the edges where configuration or simulated scenarios are loaded.

use thiserror::Error;

/// Errors that can occur while loading configuration or scenarios
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
