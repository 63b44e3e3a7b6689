//! Watchface Health - on-device health metric aggregation and sleep tracking
//!
//! Periodically samples today's cumulative activity metrics (steps, distance,
//! calories, sleep, deep sleep), compares each against a trailing baseline and
//! formats the results for a watchface, while a debounced state machine decides
//! when the sleep panel should be shown.
//!
//! ## Modules
//!
//! - **Averaging**: native or manual baselines per metric family
//! - **Collectors**: one descriptor-driven collector for all five modules
//! - **Scheduler**: coalescing refresh flag
//! - **Sleep**: rate-limited sampling with a post-wake grace window
//! - **Snapshot**: cold-start display text persistence
//! - **Session**: the context object the host platform drives

pub mod averaging;
pub mod collectors;
pub mod error;
pub mod platform;
pub mod scheduler;
pub mod session;
pub mod sim;
pub mod sleep;
pub mod snapshot;
pub mod types;

pub use error::HealthError;
pub use platform::{Clock, Configuration, Display, HealthService, Persistence, Platform};
pub use session::HealthSession;
pub use types::{MetricKind, MetricSample, ModuleConfig};

/// Crate version reported by the CLI
pub const HEALTH_VERSION: &str = env!("CARGO_PKG_VERSION");
