//! Platform collaborators
//!
//! The watchface core only talks to the outside world through these traits:
//! the health service that answers metric queries, the configuration store,
//! the display, durable string storage and the wall clock. Anything that
//! implements all five is a [`Platform`] and can drive a
//! [`HealthSession`](crate::session::HealthSession).

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    AccessMask, ActivityMask, MeasurementSystem, Metric, MetricKind, TimeScope,
};

/// Seconds in one calendar day
pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Half-open time range `[start, end)` used for metric queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Shift both ends of the range into the past
    pub fn days_back(&self, days: i64) -> Self {
        let offset = Duration::days(days);
        Self {
            start: self.start - offset,
            end: self.end - offset,
        }
    }

    /// The whole calendar day starting at `start`, ending one second before midnight
    pub fn full_day(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: start + Duration::seconds(SECONDS_PER_DAY - 1),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Health service exposed by the wearable platform
pub trait HealthService {
    /// Whether `metric` can be summed over `range`
    fn metric_accessible(&self, metric: Metric, range: TimeRange) -> AccessMask;

    /// Whether the platform can average `metric` over `range` for `scope`
    fn metric_averaged_accessible(
        &self,
        metric: Metric,
        range: TimeRange,
        scope: TimeScope,
    ) -> AccessMask;

    /// Cumulative value for today so far
    fn sum_today(&self, metric: Metric) -> i64;

    /// Cumulative value over an arbitrary range
    fn sum(&self, metric: Metric, range: TimeRange) -> i64;

    /// Platform computed average over `range` for `scope`
    fn sum_averaged(&self, metric: Metric, range: TimeRange, scope: TimeScope) -> i64;

    /// Unit system the user chose for `metric`
    fn measurement_system_for(&self, metric: Metric) -> MeasurementSystem;

    /// Activities the wearer is engaged in right now
    fn peek_current_activity(&self) -> ActivityMask;

    /// Start delivering health events to the session. Returns false on failure.
    fn subscribe_events(&mut self) -> bool;

    fn unsubscribe_events(&mut self);
}

/// Watchface settings
pub trait Configuration {
    fn module_enabled(&self, kind: MetricKind) -> bool;
    fn health_toggle_enabled(&self) -> bool;
    fn use_km_enabled(&self) -> bool;
    fn use_calories_enabled(&self) -> bool;
    fn sleep_tracking_enabled(&self) -> bool;
}

/// Write-only display sink
pub trait Display {
    fn set_field_text(&mut self, field: MetricKind, text: &str);

    /// `true` selects the "behind usual" colour, `false` the neutral one
    fn set_trend_color(&mut self, field: MetricKind, behind: bool);

    fn request_redraw(&mut self);
}

/// Durable per-key string storage
pub trait Persistence {
    fn read_string(&self, key: &str) -> Option<String>;
    fn write_string(&mut self, key: &str, value: &str);
}

/// Local wall clock
pub trait Clock {
    fn now(&self) -> DateTime<FixedOffset>;

    /// Local midnight of the current day
    fn start_of_today(&self) -> DateTime<Utc> {
        let now = self.now();
        let midnight = now.date_naive().and_time(NaiveTime::MIN);
        match now.offset().from_local_datetime(&midnight).single() {
            Some(local) => local.with_timezone(&Utc),
            None => now.with_timezone(&Utc),
        }
    }

    /// Today's range from local midnight up to now
    fn today(&self) -> TimeRange {
        TimeRange::new(self.start_of_today(), self.now().with_timezone(&Utc))
    }
}

/// Everything a health session needs from its host
pub trait Platform: HealthService + Configuration + Display + Persistence + Clock {}

impl<T> Platform for T where T: HealthService + Configuration + Display + Persistence + Clock {}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(DateTime<FixedOffset>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<FixedOffset> {
            self.0
        }
    }

    #[test]
    fn test_start_of_today_uses_local_midnight() {
        let now = DateTime::parse_from_rfc3339("2024-01-15T01:30:00+02:00").unwrap();
        let clock = FixedClock(now);

        let start = clock.start_of_today();
        assert_eq!(start.to_rfc3339(), "2024-01-14T22:00:00+00:00");

        let today = clock.today();
        assert_eq!(today.end, now.with_timezone(&Utc));
        assert_eq!((today.end - today.start).num_minutes(), 90);
    }

    #[test]
    fn test_range_shifts() {
        let start = DateTime::parse_from_rfc3339("2024-01-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let range = TimeRange::full_day(start);
        assert_eq!((range.end - range.start).num_seconds(), SECONDS_PER_DAY - 1);

        let shifted = range.days_back(7);
        assert_eq!(shifted.start.to_rfc3339(), "2024-01-08T00:00:00+00:00");
        assert!(shifted.contains(shifted.start));
        assert!(!shifted.contains(shifted.end));
    }
}
