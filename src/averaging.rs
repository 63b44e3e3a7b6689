//! Baseline averaging
//!
//! Computes the "usual" value a metric is compared against. When the platform
//! offers a native averaging primitive the engine asks it directly; otherwise
//! it rebuilds the baseline from plain ranged sums:
//!
//! - Activity family: today's range shifted back 7, 14, 21 and 28 days, total / 4
//! - Sleep family: each of the seven previous calendar days, total / 7
//!
//! The two paths are kept as they are even though the native one is
//! weekday/weekend aware and the manual one is not.

use chrono::Duration;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::platform::{HealthService, TimeRange};
use crate::types::{Metric, MetricFamily, TimeScope};

/// Scope used for every native averaging query
pub const AVERAGING_SCOPE: TimeScope = TimeScope::DailyWeekdayOrWeekend;

/// Day offsets sampled by the activity fallback
pub const ACTIVITY_WEEK_OFFSETS: [i64; 4] = [7, 14, 21, 28];

/// Number of prior days sampled by the sleep fallback
pub const SLEEP_FALLBACK_DAYS: i64 = 7;

/// Where a baseline value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineSource {
    /// Platform averaging primitive
    Native,
    /// Manual sum-then-divide over prior windows
    Manual,
}

/// A computed baseline and the path that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub value: i64,
    pub source: BaselineSource,
}

/// Averaging request for one module.
///
/// Calories are the sum of two platform metrics, so a window carries a list
/// of metrics whose values are added together on every query.
#[derive(Debug, Clone, Copy)]
pub struct AveragingWindow<'a> {
    pub metrics: &'a [Metric],
    /// Local midnight up to now
    pub today: TimeRange,
    pub family: MetricFamily,
}

impl<'a> AveragingWindow<'a> {
    pub fn new(metrics: &'a [Metric], today: TimeRange, family: MetricFamily) -> Self {
        Self {
            metrics,
            today,
            family,
        }
    }

    /// Range handed to the native averaging query
    pub fn averaged_range(&self) -> TimeRange {
        match self.family {
            MetricFamily::Activity => self.today,
            MetricFamily::Sleep => TimeRange::full_day(self.today.start),
        }
    }

    /// Ranges summed by the manual fallback
    pub fn fallback_ranges(&self) -> Vec<TimeRange> {
        match self.family {
            MetricFamily::Activity => ACTIVITY_WEEK_OFFSETS
                .iter()
                .map(|days| {
                    TimeRange::new(self.today.start, self.today.start + Duration::days(1))
                        .days_back(*days)
                })
                .collect(),
            MetricFamily::Sleep => (1..=SLEEP_FALLBACK_DAYS)
                .map(|i| {
                    TimeRange::new(
                        self.today.start - Duration::days(i),
                        self.today.start - Duration::days(i - 1),
                    )
                })
                .collect(),
        }
    }

    /// Divisor applied to the manual fallback total
    pub fn fallback_divisor(&self) -> i64 {
        match self.family {
            MetricFamily::Activity => ACTIVITY_WEEK_OFFSETS.len() as i64,
            MetricFamily::Sleep => SLEEP_FALLBACK_DAYS,
        }
    }
}

/// Stateless baseline calculator
pub struct AveragingEngine;

impl AveragingEngine {
    /// Whether any metric of the window has a native average for today
    pub fn native_available<H: HealthService + ?Sized>(
        health: &H,
        window: &AveragingWindow<'_>,
    ) -> bool {
        window.metrics.iter().any(|metric| {
            health
                .metric_averaged_accessible(*metric, window.today, AVERAGING_SCOPE)
                .is_available()
        })
    }

    /// Compute the baseline for a window, preferring the native primitive
    pub fn compute<H: HealthService + ?Sized>(
        health: &H,
        window: &AveragingWindow<'_>,
    ) -> Baseline {
        if Self::native_available(health, window) {
            let range = window.averaged_range();
            let value = window
                .metrics
                .iter()
                .map(|metric| health.sum_averaged(*metric, range, AVERAGING_SCOPE))
                .sum();
            debug!("Using API average for {:?}: {}", window.metrics, value);
            return Baseline {
                value,
                source: BaselineSource::Native,
            };
        }

        let total: i64 = window
            .fallback_ranges()
            .into_iter()
            .flat_map(|range| window.metrics.iter().map(move |metric| (*metric, range)))
            .map(|(metric, range)| health.sum(metric, range))
            .sum();
        let value = total / window.fallback_divisor();
        debug!("Using manual average for {:?}: {}", window.metrics, value);

        Baseline {
            value,
            source: BaselineSource::Manual,
        }
    }
}

/// Baseline for a single metric over today's range
pub fn compute_baseline<H: HealthService + ?Sized>(
    health: &H,
    metric: Metric,
    today: TimeRange,
    family: MetricFamily,
) -> i64 {
    let metrics = [metric];
    AveragingEngine::compute(health, &AveragingWindow::new(&metrics, today, family)).value
}
