//! Core types for watchface health aggregation
//!
//! This module defines the identifiers, masks and value types shared by every
//! stage: platform metric ids, the five display modules, accessibility and
//! activity masks, per-pass metric samples and the module configuration.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::HealthError;

/// Maximum number of characters a display field can hold.
///
/// The watch stores each field in a 16 byte buffer including the terminator.
pub const MAX_TEXT_LEN: usize = 15;

/// Raw metric identifiers understood by the platform health service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    StepCount,
    WalkedDistanceMeters,
    #[serde(rename = "resting_kcalories")]
    RestingKCalories,
    #[serde(rename = "active_kcalories")]
    ActiveKCalories,
    SleepSeconds,
    SleepRestfulSeconds,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::StepCount => "step_count",
            Metric::WalkedDistanceMeters => "walked_distance_meters",
            Metric::RestingKCalories => "resting_kcalories",
            Metric::ActiveKCalories => "active_kcalories",
            Metric::SleepSeconds => "sleep_seconds",
            Metric::SleepRestfulSeconds => "sleep_restful_seconds",
        }
    }
}

/// The five health modules a watchface can show
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Steps,
    Distance,
    Calories,
    Sleep,
    DeepSleep,
}

impl MetricKind {
    /// Fixed order in which an aggregation pass visits the modules
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Steps,
        MetricKind::Distance,
        MetricKind::Calories,
        MetricKind::Sleep,
        MetricKind::DeepSleep,
    ];

    /// Storage key and display name of the module
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Steps => "steps",
            MetricKind::Distance => "distance",
            MetricKind::Calories => "calories",
            MetricKind::Sleep => "sleep",
            MetricKind::DeepSleep => "deep_sleep",
        }
    }

    pub fn family(&self) -> MetricFamily {
        match self {
            MetricKind::Steps | MetricKind::Distance | MetricKind::Calories => {
                MetricFamily::Activity
            }
            MetricKind::Sleep | MetricKind::DeepSleep => MetricFamily::Sleep,
        }
    }
}

/// Baseline family deciding the historical window of the manual fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    /// Steps, distance, calories: same time of day over the four prior weeks
    Activity,
    /// Sleep, deep sleep: the seven prior calendar days
    Sleep,
}

/// Time scope passed to the platform averaging primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeScope {
    Once,
    Weekly,
    DailyWeekdayOrWeekend,
    Daily,
}

/// Unit system reported by the platform for a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementSystem {
    Metric,
    Imperial,
    #[default]
    Unknown,
}

/// Events delivered by the platform health service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthEventKind {
    SignificantUpdate,
    MovementUpdate,
    SleepUpdate,
    MetricAlert,
    HeartRateUpdate,
}

impl HealthEventKind {
    /// Whether the event should schedule a metric refresh
    pub fn requests_refresh(&self) -> bool {
        matches!(
            self,
            HealthEventKind::SignificantUpdate
                | HealthEventKind::MovementUpdate
                | HealthEventKind::SleepUpdate
        )
    }
}

bitflags! {
    /// Result of an accessibility query
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AccessMask: u8 {
        const AVAILABLE = 1 << 0;
        const NO_PERMISSION = 1 << 1;
        const NOT_SUPPORTED = 1 << 2;
        const NOT_AVAILABLE = 1 << 3;
    }
}

impl AccessMask {
    pub fn is_available(&self) -> bool {
        self.contains(AccessMask::AVAILABLE)
    }
}

bitflags! {
    /// Activities the wearer is currently engaged in
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ActivityMask: u8 {
        const SLEEP = 1 << 0;
        const RESTFUL_SLEEP = 1 << 1;
        const WALK = 1 << 2;
        const RUN = 1 << 3;
        const OPEN_WORKOUT = 1 << 4;
    }
}

impl ActivityMask {
    /// True when either sleep bit is set
    pub fn is_sleeping(&self) -> bool {
        self.intersects(ActivityMask::SLEEP | ActivityMask::RESTFUL_SLEEP)
    }
}

/// One metric's result for a single aggregation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Module this sample belongs to
    pub kind: MetricKind,
    /// Today's cumulative value in the metric's native unit
    pub current: i64,
    /// Trailing average in the same unit
    pub baseline: i64,
    /// True when today is behind the usual value
    pub trend: bool,
    /// Formatted text, at most [`MAX_TEXT_LEN`] characters
    pub display_text: String,
}

impl MetricSample {
    pub fn new(kind: MetricKind, current: i64, baseline: i64, display_text: String) -> Self {
        Self {
            kind,
            current,
            baseline,
            trend: current < baseline,
            display_text: bounded_text(&display_text),
        }
    }
}

/// Truncate text to what a display field can hold
pub fn bounded_text(text: &str) -> String {
    text.chars().take(MAX_TEXT_LEN).collect()
}

/// Module configuration supplied by the watchface settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Modules the user placed on the watchface
    pub enabled_modules: Vec<MetricKind>,
    /// Master health switch, independent of the module list
    pub health_toggle: bool,
    /// Kilometers when true, miles otherwise (used when the platform does not know)
    pub use_km: bool,
    /// Calorie display preference
    pub use_calories: bool,
    /// Show the sleep panel while asleep and shortly after waking
    pub sleep_tracking: bool,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            enabled_modules: MetricKind::ALL.to_vec(),
            health_toggle: false,
            use_km: true,
            use_calories: true,
            sleep_tracking: true,
        }
    }
}

impl ModuleConfig {
    pub fn is_enabled(&self, kind: MetricKind) -> bool {
        self.enabled_modules.contains(&kind)
    }

    /// Load configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, HealthError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, HealthError> {
        Ok(serde_json::to_string(self)?)
    }
}
