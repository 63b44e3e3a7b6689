//! Metric collectors
//!
//! Every module follows the same shape: check availability, sum today, ask the
//! averaging engine for a baseline, format the value. The differences between
//! steps, distance, calories, sleep and deep sleep live in a small
//! [`MetricDescriptor`] instead of five hand-written collectors.

use log::debug;

use crate::averaging::{AveragingEngine, AveragingWindow};
use crate::platform::{HealthService, TimeRange};
use crate::types::{Metric, MetricKind, MetricSample};

/// Meters per displayed "mile". The watchface has always used 1.6.
pub const METERS_PER_MILE_FACTOR: f64 = 1.6;

const SECONDS_PER_HOUR: i64 = 3600;
const SECONDS_PER_MINUTE: i64 = 60;

/// User preferences that affect formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub use_km: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self { use_km: true }
    }
}

/// Per-module collection recipe
#[derive(Clone, Copy)]
pub struct MetricDescriptor {
    pub kind: MetricKind,
    /// Platform metrics summed into the module's value
    pub metrics: &'static [Metric],
    /// Turns today's native value into display text
    pub format: fn(i64, &FormatOptions) -> String,
}

pub const STEPS: MetricDescriptor = MetricDescriptor {
    kind: MetricKind::Steps,
    metrics: &[Metric::StepCount],
    format: format_steps,
};

pub const DISTANCE: MetricDescriptor = MetricDescriptor {
    kind: MetricKind::Distance,
    metrics: &[Metric::WalkedDistanceMeters],
    format: format_distance,
};

pub const CALORIES: MetricDescriptor = MetricDescriptor {
    kind: MetricKind::Calories,
    metrics: &[Metric::RestingKCalories, Metric::ActiveKCalories],
    format: format_calories,
};

pub const SLEEP: MetricDescriptor = MetricDescriptor {
    kind: MetricKind::Sleep,
    metrics: &[Metric::SleepSeconds],
    format: format_duration,
};

pub const DEEP_SLEEP: MetricDescriptor = MetricDescriptor {
    kind: MetricKind::DeepSleep,
    metrics: &[Metric::SleepRestfulSeconds],
    format: format_duration,
};

impl MetricDescriptor {
    pub fn for_kind(kind: MetricKind) -> &'static MetricDescriptor {
        match kind {
            MetricKind::Steps => &STEPS,
            MetricKind::Distance => &DISTANCE,
            MetricKind::Calories => &CALORIES,
            MetricKind::Sleep => &SLEEP,
            MetricKind::DeepSleep => &DEEP_SLEEP,
        }
    }

    /// A module is available when any of its platform metrics is
    pub fn is_available<H: HealthService + ?Sized>(&self, health: &H, today: TimeRange) -> bool {
        self.metrics
            .iter()
            .any(|metric| health.metric_accessible(*metric, today).is_available())
    }

    pub fn window(&self, today: TimeRange) -> AveragingWindow<'static> {
        AveragingWindow::new(self.metrics, today, self.kind.family())
    }

    /// Collect today's sample, or `None` when the platform cannot provide it
    pub fn collect<H: HealthService + ?Sized>(
        &self,
        health: &H,
        today: TimeRange,
        options: &FormatOptions,
    ) -> Option<MetricSample> {
        if !self.is_available(health, today) {
            debug!("{} unavailable, skipping", self.kind.as_str());
            return None;
        }

        let current: i64 = self.metrics.iter().map(|m| health.sum_today(*m)).sum();
        let baseline = AveragingEngine::compute(health, &self.window(today));
        debug!(
            "{} data: {} / {}",
            self.kind.as_str(),
            current,
            baseline.value
        );

        // trend compares native units, before any display conversion
        Some(MetricSample::new(
            self.kind,
            current,
            baseline.value,
            (self.format)(current, options),
        ))
    }
}

pub fn format_steps(steps: i64, _options: &FormatOptions) -> String {
    steps.to_string()
}

/// `"{int}.{tenths}km"` or `"{int}.{tenths}mi"`, truncating
pub fn format_distance(meters: i64, options: &FormatOptions) -> String {
    let (value, unit) = if options.use_km {
        (meters, "km")
    } else {
        ((meters as f64 / METERS_PER_MILE_FACTOR) as i64, "mi")
    };
    format!("{}.{}{}", value / 1000, (value % 1000) / 100, unit)
}

pub fn format_calories(kcal: i64, _options: &FormatOptions) -> String {
    format!("{kcal} cal")
}

/// `"{h}h{mm}m"` with minutes zero-padded
pub fn format_duration(seconds: i64, _options: &FormatOptions) -> String {
    let hours = seconds / SECONDS_PER_HOUR;
    let minutes = (seconds - hours * SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    format!("{hours}h{minutes:02}m")
}
