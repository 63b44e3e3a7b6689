//! In-memory simulated watch platform
//!
//! Implements every collaborator trait on top of a list of timestamped metric
//! records, a settable wall clock and recording display/storage sinks. The CLI
//! loads it from a scenario JSON file; tests use it as their platform double.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HealthError;
use crate::platform::{
    Clock, Configuration, Display, HealthService, Persistence, TimeRange,
};
use crate::scheduler::UpdateTrigger;
use crate::types::{
    AccessMask, ActivityMask, MeasurementSystem, Metric, MetricKind, ModuleConfig, TimeScope,
};

/// A value recorded by the wearable at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub metric: Metric,
    pub at: DateTime<Utc>,
    pub value: i64,
}

/// What the simulated screen currently shows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Screen {
    pub fields: BTreeMap<MetricKind, String>,
    pub behind: BTreeMap<MetricKind, bool>,
    pub redraws: usize,
}

/// Simulated platform state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedPlatform {
    /// Local wall clock
    pub now: DateTime<FixedOffset>,
    #[serde(default)]
    pub config: ModuleConfig,
    #[serde(default)]
    pub records: Vec<MetricRecord>,
    /// Metrics with a native weekday/weekend average and its value
    #[serde(default)]
    pub native_averages: HashMap<Metric, i64>,
    /// Metrics the user has not granted access to
    #[serde(default)]
    pub denied: Vec<Metric>,
    /// Metrics this watch cannot measure
    #[serde(default)]
    pub unsupported: Vec<Metric>,
    #[serde(default)]
    pub measurement_system: MeasurementSystem,
    #[serde(default)]
    pub activity: ActivityMask,
    #[serde(default)]
    pub subscribe_fails: bool,
    /// Durable key/value storage
    #[serde(default)]
    pub storage: BTreeMap<String, String>,
    #[serde(skip)]
    pub screen: Screen,
    #[serde(skip)]
    subscribed: bool,
    #[serde(skip)]
    queries: Cell<usize>,
    #[serde(skip)]
    activity_queries: Cell<usize>,
    #[serde(skip)]
    mid_pass_trigger: RefCell<Option<UpdateTrigger>>,
}

impl SimulatedPlatform {
    /// Empty platform with the clock set to an RFC 3339 timestamp
    pub fn at(rfc3339: &str) -> Result<Self, HealthError> {
        let now = DateTime::parse_from_rfc3339(rfc3339)
            .map_err(|e| HealthError::InvalidTimestamp(format!("{rfc3339}: {e}")))?;
        Ok(Self {
            now,
            config: ModuleConfig::default(),
            records: Vec::new(),
            native_averages: HashMap::new(),
            denied: Vec::new(),
            unsupported: Vec::new(),
            measurement_system: MeasurementSystem::Unknown,
            activity: ActivityMask::empty(),
            subscribe_fails: false,
            storage: BTreeMap::new(),
            screen: Screen::default(),
            subscribed: false,
            queries: Cell::new(0),
            activity_queries: Cell::new(0),
            mid_pass_trigger: RefCell::new(None),
        })
    }

    /// Load a scenario from JSON
    pub fn from_json(json: &str) -> Result<Self, HealthError> {
        let platform: Self = serde_json::from_str(json)?;
        if let Some(record) = platform.records.iter().find(|r| r.value < 0) {
            return Err(HealthError::InvalidScenario(format!(
                "negative value {} for {} at {}",
                record.value,
                record.metric.as_str(),
                record.at
            )));
        }
        Ok(platform)
    }

    pub fn record(&mut self, metric: Metric, at: DateTime<Utc>, value: i64) {
        self.records.push(MetricRecord { metric, at, value });
    }

    /// Record a value earlier today, `hours` after local midnight
    pub fn record_today(&mut self, metric: Metric, hours: i64, value: i64) {
        let at = self.start_of_today() + Duration::hours(hours);
        self.record(metric, at, value);
    }

    pub fn set_native_average(&mut self, metric: Metric, value: i64) {
        self.native_averages.insert(metric, value);
    }

    /// Move the clock forward, failing if it would leave chrono's range
    pub fn advance(&mut self, by: Duration) -> Result<(), HealthError> {
        self.now = self
            .now
            .checked_add_signed(by)
            .ok_or_else(|| HealthError::InvalidTimestamp(format!("{} + {by}", self.now)))?;
        Ok(())
    }

    /// Fire `trigger` once, on the next data query
    pub fn trigger_during_next_query(&self, trigger: UpdateTrigger) {
        *self.mid_pass_trigger.borrow_mut() = Some(trigger);
    }

    pub fn field(&self, kind: MetricKind) -> Option<&str> {
        self.screen.fields.get(&kind).map(String::as_str)
    }

    pub fn is_behind(&self, kind: MetricKind) -> Option<bool> {
        self.screen.behind.get(&kind).copied()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Number of sum queries (today, ranged and averaged) served so far
    pub fn query_count(&self) -> usize {
        self.queries.get()
    }

    pub fn activity_query_count(&self) -> usize {
        self.activity_queries.get()
    }

    fn sum_in(&self, metric: Metric, range: TimeRange) -> i64 {
        self.queries.set(self.queries.get() + 1);
        if let Some(trigger) = self.mid_pass_trigger.borrow_mut().take() {
            trigger.request_update();
        }
        self.records
            .iter()
            .filter(|r| r.metric == metric && range.contains(r.at))
            .map(|r| r.value)
            .sum()
    }
}

impl HealthService for SimulatedPlatform {
    fn metric_accessible(&self, metric: Metric, _range: TimeRange) -> AccessMask {
        if self.denied.contains(&metric) {
            AccessMask::NO_PERMISSION
        } else if self.unsupported.contains(&metric) {
            AccessMask::NOT_SUPPORTED
        } else {
            AccessMask::AVAILABLE
        }
    }

    fn metric_averaged_accessible(
        &self,
        metric: Metric,
        range: TimeRange,
        _scope: TimeScope,
    ) -> AccessMask {
        let mask = self.metric_accessible(metric, range);
        if mask.is_available() && !self.native_averages.contains_key(&metric) {
            AccessMask::NOT_SUPPORTED
        } else {
            mask
        }
    }

    fn sum_today(&self, metric: Metric) -> i64 {
        self.sum_in(metric, self.today())
    }

    fn sum(&self, metric: Metric, range: TimeRange) -> i64 {
        self.sum_in(metric, range)
    }

    fn sum_averaged(&self, metric: Metric, _range: TimeRange, _scope: TimeScope) -> i64 {
        self.queries.set(self.queries.get() + 1);
        self.native_averages.get(&metric).copied().unwrap_or(0)
    }

    fn measurement_system_for(&self, _metric: Metric) -> MeasurementSystem {
        self.measurement_system
    }

    fn peek_current_activity(&self) -> ActivityMask {
        self.activity_queries.set(self.activity_queries.get() + 1);
        self.activity
    }

    fn subscribe_events(&mut self) -> bool {
        self.subscribed = !self.subscribe_fails;
        self.subscribed
    }

    fn unsubscribe_events(&mut self) {
        self.subscribed = false;
    }
}

impl Configuration for SimulatedPlatform {
    fn module_enabled(&self, kind: MetricKind) -> bool {
        self.config.is_enabled(kind)
    }

    fn health_toggle_enabled(&self) -> bool {
        self.config.health_toggle
    }

    fn use_km_enabled(&self) -> bool {
        self.config.use_km
    }

    fn use_calories_enabled(&self) -> bool {
        self.config.use_calories
    }

    fn sleep_tracking_enabled(&self) -> bool {
        self.config.sleep_tracking
    }
}

impl Display for SimulatedPlatform {
    fn set_field_text(&mut self, field: MetricKind, text: &str) {
        self.screen.fields.insert(field, text.to_string());
    }

    fn set_trend_color(&mut self, field: MetricKind, behind: bool) {
        self.screen.behind.insert(field, behind);
    }

    fn request_redraw(&mut self) {
        self.screen.redraws += 1;
    }
}

impl Persistence for SimulatedPlatform {
    fn read_string(&self, key: &str) -> Option<String> {
        self.storage.get(key).cloned()
    }

    fn write_string(&mut self, key: &str, value: &str) {
        self.storage.insert(key.to_string(), value.to_string());
    }
}

impl Clock for SimulatedPlatform {
    fn now(&self) -> DateTime<FixedOffset> {
        self.now
    }
}
