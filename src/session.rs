//! Watchface health session
//!
//! [`HealthSession`] owns all mutable health state for one watchface session
//! and the platform it runs on. The host calls into it from its event handler
//! and its periodic tick; everything runs synchronously to completion.
//!
//! Control flow:
//! 1. Health events, sleep transitions and configuration changes request an update
//! 2. The next tick calls [`HealthSession::run_if_pending`], which runs at most one pass
//! 3. A pass collects every enabled module and pushes text and trend to the display

use log::debug;

use crate::collectors::{FormatOptions, MetricDescriptor};
use crate::platform::{Clock, Platform};
use crate::scheduler::{UpdateScheduler, UpdateTrigger};
use crate::sleep::{SleepPhase, SleepStateMachine};
use crate::snapshot::Snapshot;
use crate::types::{AccessMask, HealthEventKind, MeasurementSystem, Metric, MetricKind, MetricSample};

/// Health aggregation and sleep tracking for one watchface session
pub struct HealthSession<P: Platform> {
    platform: P,
    scheduler: UpdateScheduler,
    sleep: SleepStateMachine,
    snapshot: Snapshot,
    health_enabled: bool,
    sleep_data_enabled: bool,
    format: FormatOptions,
    use_calories: bool,
    passes: usize,
}

impl<P: Platform> HealthSession<P> {
    /// Create a session with health tracking off until the first toggle
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            scheduler: UpdateScheduler::new(),
            sleep: SleepStateMachine::new(),
            snapshot: Snapshot::default(),
            health_enabled: false,
            sleep_data_enabled: false,
            format: FormatOptions::default(),
            use_calories: true,
            passes: 0,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Persist the snapshot, stop receiving events and hand the platform back
    pub fn teardown(mut self) -> P {
        self.persist_snapshot();
        self.platform.unsubscribe_events();
        self.platform
    }

    pub fn is_health_enabled(&self) -> bool {
        self.health_enabled
    }

    /// Handle for event sources that only need to request updates
    pub fn trigger(&self) -> UpdateTrigger {
        self.scheduler.trigger()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Number of aggregation passes run so far
    pub fn pass_count(&self) -> usize {
        self.passes
    }

    pub fn format_options(&self) -> FormatOptions {
        self.format
    }

    /// Calorie display preference captured at the last toggle
    pub fn uses_calories(&self) -> bool {
        self.use_calories
    }

    fn wants_health(&self) -> bool {
        self.platform.health_toggle_enabled()
            || MetricKind::ALL
                .iter()
                .any(|kind| self.platform.module_enabled(*kind))
    }

    /// Steps permission over today decides whether health data may be read at all
    fn permission_granted(&self) -> bool {
        if !self.health_enabled {
            return false;
        }
        let mask = self
            .platform
            .metric_accessible(Metric::StepCount, self.platform.today());
        !mask.contains(AccessMask::NO_PERMISSION)
    }

    fn resolve_distance_unit(&self) -> bool {
        match self.platform.measurement_system_for(Metric::WalkedDistanceMeters) {
            MeasurementSystem::Metric => {
                debug!("Using API measure system");
                true
            }
            MeasurementSystem::Imperial => {
                debug!("Using API measure system");
                false
            }
            MeasurementSystem::Unknown => {
                debug!("Using config measure system");
                self.platform.use_km_enabled()
            }
        }
    }

    fn clear_fields(&mut self) {
        for kind in MetricKind::ALL {
            self.platform.set_field_text(kind, "");
        }
    }

    /// Re-evaluate the master health gate.
    ///
    /// `from_config` is true when the user just changed settings, in which case
    /// fresh data is collected right away instead of showing the snapshot.
    pub fn on_master_toggle_changed(&mut self, from_config: bool) {
        self.sleep.reset_sample();
        self.health_enabled = self.wants_health();
        self.sleep_data_enabled = self.platform.sleep_tracking_enabled();
        let mut subscribed = false;

        if self.health_enabled {
            self.format.use_km = self.resolve_distance_unit();
            self.use_calories = self.platform.use_calories_enabled();
            debug!("Health enabled");

            if self.permission_granted() {
                debug!("Health permission granted");
                subscribed = self.platform.subscribe_events();
                if subscribed {
                    self.clear_fields();
                    self.request_update();
                    if from_config {
                        self.run_if_pending();
                    } else {
                        self.load_snapshot();
                    }
                }
            } else {
                debug!("Health permission not granted");
            }
        }

        if !self.health_enabled || !subscribed {
            debug!("Health disabled");
            self.health_enabled = false;
            self.clear_fields();
            self.platform.unsubscribe_events();
        }
    }

    /// Entry point for the platform's health event feed
    pub fn on_health_event(&self, kind: HealthEventKind) {
        if kind.requests_refresh() {
            debug!("Requesting update from event {kind:?}");
            self.request_update();
        }
    }

    pub fn request_update(&self) {
        self.scheduler.request_update();
    }

    pub fn is_update_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Collect one module now, without touching the display
    pub fn collect(&self, kind: MetricKind) -> Option<MetricSample> {
        MetricDescriptor::for_kind(kind).collect(&self.platform, self.platform.today(), &self.format)
    }

    /// Run one aggregation pass if one is pending. Returns whether a pass ran.
    pub fn run_if_pending(&mut self) -> bool {
        if !self.health_enabled || !self.scheduler.take_pending() {
            return false;
        }
        debug!("Updating health data");

        let today = self.platform.today();
        for kind in MetricKind::ALL {
            if !self.platform.module_enabled(kind) {
                continue;
            }
            let descriptor = MetricDescriptor::for_kind(kind);
            if let Some(sample) = descriptor.collect(&self.platform, today, &self.format) {
                self.platform.set_field_text(kind, &sample.display_text);
                self.platform.set_trend_color(kind, sample.trend);
                self.snapshot.set(kind, &sample.display_text);
            }
        }

        self.passes += 1;
        debug!("Health data updated");
        true
    }

    /// Whether the wearer is asleep, sampled at most once per 10 minutes
    pub fn is_sleeping(&mut self) -> bool {
        if !self.health_enabled {
            return false;
        }
        let now = self.platform.now();
        self.sleep.sample(now, &self.platform)
    }

    /// Advance the sleep state machine; called from the periodic tick
    pub fn refresh_sleep_visibility(&mut self) {
        if !(self.health_enabled && self.sleep_data_enabled) {
            return;
        }
        let now = self.platform.now();
        let effects = self.sleep.refresh(now, &self.platform);
        if effects.request_update {
            self.request_update();
        }
        if effects.request_redraw {
            self.platform.request_redraw();
        }
    }

    pub fn init_sleep_state(&mut self) {
        self.sleep.init();
    }

    pub fn is_sleep_panel_visible(&self) -> bool {
        self.sleep.is_visible()
    }

    pub fn sleep_phase(&self) -> SleepPhase {
        self.sleep.phase()
    }

    /// Write the current display text of every module to storage
    pub fn persist_snapshot(&mut self) {
        self.snapshot.save(&mut self.platform);
    }

    fn load_snapshot(&mut self) {
        let platform = &mut self.platform;
        let enabled: Vec<MetricKind> = MetricKind::ALL
            .into_iter()
            .filter(|kind| platform.module_enabled(*kind))
            .collect();
        self.snapshot.load(platform, |kind| enabled.contains(&kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Persistence;
    use crate::sim::SimulatedPlatform;
    use crate::types::ActivityMask;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn active_day() -> SimulatedPlatform {
        let mut sim = SimulatedPlatform::at("2024-01-29T18:00:00Z").unwrap();
        sim.record_today(Metric::StepCount, 9, 4200);
        sim.record_today(Metric::WalkedDistanceMeters, 9, 3250);
        sim.record_today(Metric::RestingKCalories, 9, 1400);
        sim.record_today(Metric::ActiveKCalories, 9, 320);
        sim.record_today(Metric::SleepSeconds, 2, 26_100);
        sim.record_today(Metric::SleepRestfulSeconds, 2, 5_400);
        sim.set_native_average(Metric::StepCount, 8000);
        sim.set_native_average(Metric::WalkedDistanceMeters, 3000);
        sim
    }

    #[test]
    fn test_toggle_captures_display_preferences() {
        let mut sim = active_day();
        sim.config.use_calories = false;
        sim.config.use_km = false;
        let mut session = HealthSession::new(sim);
        assert!(session.uses_calories());

        session.on_master_toggle_changed(true);

        assert!(!session.uses_calories());
        assert!(!session.format_options().use_km);
        assert_eq!(session.platform().field(MetricKind::Distance), Some("2.0mi"));
    }

    #[test]
    fn test_toggle_from_config_runs_pass_immediately() {
        let mut session = HealthSession::new(active_day());
        session.on_master_toggle_changed(true);

        let sim = session.platform();
        assert!(session.is_health_enabled());
        assert!(sim.is_subscribed());
        assert_eq!(session.pass_count(), 1);
        assert_eq!(sim.field(MetricKind::Steps), Some("4200"));
        assert_eq!(sim.is_behind(MetricKind::Steps), Some(true));
        assert_eq!(sim.field(MetricKind::Distance), Some("3.2km"));
        assert_eq!(sim.is_behind(MetricKind::Distance), Some(false));
        assert_eq!(sim.field(MetricKind::Calories), Some("1720 cal"));
        assert_eq!(sim.field(MetricKind::Sleep), Some("7h15m"));
        assert_eq!(sim.field(MetricKind::DeepSleep), Some("1h30m"));
        assert!(!session.is_update_pending());
    }

    #[test]
    fn test_cold_start_shows_snapshot_with_neutral_trend() {
        let mut sim = active_day();
        sim.write_string("steps", "9999");
        sim.write_string("sleep", "8h00m");
        let mut session = HealthSession::new(sim);

        session.on_master_toggle_changed(false);

        assert_eq!(session.pass_count(), 0);
        assert!(session.is_update_pending());
        assert_eq!(session.platform().field(MetricKind::Steps), Some("9999"));
        assert_eq!(session.platform().is_behind(MetricKind::Steps), Some(false));
        assert_eq!(session.platform().field(MetricKind::Distance), Some(""));

        // first live pass overwrites the stale text
        assert!(session.run_if_pending());
        assert_eq!(session.platform().field(MetricKind::Steps), Some("4200"));
        assert_eq!(session.platform().is_behind(MetricKind::Steps), Some(true));
        assert_eq!(session.snapshot().sleep, "7h15m");
    }

    #[test]
    fn test_requests_coalesce_into_one_pass() {
        let mut session = HealthSession::new(active_day());
        session.on_master_toggle_changed(true);
        let before = session.pass_count();

        for _ in 0..10 {
            session.request_update();
        }
        session.on_health_event(HealthEventKind::MovementUpdate);
        session.trigger().request_update();

        assert!(session.run_if_pending());
        assert!(!session.run_if_pending());
        assert_eq!(session.pass_count(), before + 1);
    }

    #[test]
    fn test_request_during_pass_schedules_one_more() {
        let mut session = HealthSession::new(active_day());
        session.on_master_toggle_changed(true);
        let trigger = session.trigger();
        session.platform().trigger_during_next_query(trigger);

        session.request_update();
        assert!(session.run_if_pending());
        assert!(session.is_update_pending());
        assert!(session.run_if_pending());
        assert!(!session.run_if_pending());
        assert_eq!(session.pass_count(), 3);
    }

    #[test]
    fn test_events_that_do_not_request_refresh() {
        let mut session = HealthSession::new(active_day());
        session.on_master_toggle_changed(true);

        session.on_health_event(HealthEventKind::HeartRateUpdate);
        session.on_health_event(HealthEventKind::MetricAlert);
        assert!(!session.is_update_pending());
    }

    #[test]
    fn test_disabled_health_never_runs() {
        let mut sim = active_day();
        sim.config.enabled_modules.clear();
        sim.config.health_toggle = false;
        let mut session = HealthSession::new(sim);

        session.on_master_toggle_changed(true);
        session.request_update();

        assert!(!session.is_health_enabled());
        assert!(!session.run_if_pending());
        assert!(!session.is_sleeping());
        assert!(!session.platform().is_subscribed());
        assert_eq!(session.platform().field(MetricKind::Steps), Some(""));
    }

    #[test]
    fn test_permission_denied_disables_and_clears() {
        let mut sim = active_day();
        sim.denied.push(Metric::StepCount);
        let mut session = HealthSession::new(sim);

        session.on_master_toggle_changed(true);

        assert!(!session.is_health_enabled());
        assert!(!session.platform().is_subscribed());
        for kind in MetricKind::ALL {
            assert_eq!(session.platform().field(kind), Some(""));
        }
    }

    #[test]
    fn test_permission_revoked_at_next_toggle() {
        let mut session = HealthSession::new(active_day());
        session.on_master_toggle_changed(true);
        assert!(session.platform().is_subscribed());

        session.platform_mut().denied.push(Metric::StepCount);
        session.on_master_toggle_changed(true);

        assert!(!session.is_health_enabled());
        assert!(!session.platform().is_subscribed());
        assert_eq!(session.platform().field(MetricKind::Steps), Some(""));
    }

    #[test]
    fn test_failed_subscription_disables_health() {
        let mut sim = active_day();
        sim.subscribe_fails = true;
        let mut session = HealthSession::new(sim);

        session.on_master_toggle_changed(true);

        assert!(!session.is_health_enabled());
        assert_eq!(session.pass_count(), 0);
    }

    #[test]
    fn test_health_toggle_alone_enables_tracking() {
        let mut sim = active_day();
        sim.config.enabled_modules.clear();
        sim.config.health_toggle = true;
        let mut session = HealthSession::new(sim);

        session.on_master_toggle_changed(true);

        assert!(session.is_health_enabled());
        assert_eq!(session.pass_count(), 1);
        // no modules enabled, so nothing was written past the clearing
        assert_eq!(session.platform().field(MetricKind::Steps), Some(""));
    }

    #[test]
    fn test_only_enabled_modules_are_collected() {
        let mut sim = active_day();
        sim.config.enabled_modules = vec![MetricKind::Calories];
        let mut session = HealthSession::new(sim);

        session.on_master_toggle_changed(true);

        assert_eq!(session.platform().field(MetricKind::Calories), Some("1720 cal"));
        assert_eq!(session.platform().field(MetricKind::Steps), Some(""));
        assert_eq!(session.platform().is_behind(MetricKind::Steps), None);
    }

    #[test]
    fn test_unavailable_metric_keeps_previous_text() {
        let mut session = HealthSession::new(active_day());
        session.on_master_toggle_changed(true);
        assert_eq!(session.platform().field(MetricKind::DeepSleep), Some("1h30m"));

        session
            .platform_mut()
            .unsupported
            .push(Metric::SleepRestfulSeconds);
        session.platform_mut().record_today(Metric::StepCount, 17, 100);
        session.request_update();
        session.run_if_pending();

        assert_eq!(session.platform().field(MetricKind::Steps), Some("4300"));
        assert_eq!(session.platform().field(MetricKind::DeepSleep), Some("1h30m"));
    }

    #[test]
    fn test_measurement_system_precedence() {
        let mut sim = active_day();
        sim.config.use_km = true;
        sim.measurement_system = MeasurementSystem::Imperial;
        let mut session = HealthSession::new(sim);
        session.on_master_toggle_changed(true);
        assert!(!session.format_options().use_km);
        // 3250 / 1.6 = 2031
        assert_eq!(session.platform().field(MetricKind::Distance), Some("2.0mi"));

        let mut sim = active_day();
        sim.config.use_km = false;
        let mut session = HealthSession::new(sim);
        session.on_master_toggle_changed(true);
        assert!(!session.format_options().use_km);
    }

    #[test]
    fn test_sleep_transitions_drive_updates_and_redraws() {
        let mut sim = active_day();
        sim.now = chrono::DateTime::parse_from_rfc3339("2024-01-29T23:30:00Z").unwrap();
        sim.activity = ActivityMask::SLEEP;
        let mut session = HealthSession::new(sim);
        session.init_sleep_state();
        session.on_master_toggle_changed(true);

        session.refresh_sleep_visibility();
        assert!(session.is_sleep_panel_visible());
        assert!(session.is_update_pending());
        assert_eq!(session.platform().screen.redraws, 1);
        assert!(session.run_if_pending());

        session.platform_mut().activity = ActivityMask::empty();
        session.platform_mut().advance(Duration::minutes(10)).unwrap();
        session.refresh_sleep_visibility();
        assert_eq!(session.sleep_phase(), SleepPhase::RecentlyWoken);
        assert!(session.is_update_pending());
        assert_eq!(session.platform().screen.redraws, 1);
        session.run_if_pending();

        session.platform_mut().advance(Duration::minutes(31)).unwrap();
        session.refresh_sleep_visibility();
        assert!(!session.is_sleep_panel_visible());
        assert!(session.is_update_pending());
        assert_eq!(session.platform().screen.redraws, 2);
    }

    #[test]
    fn test_sleep_tracking_disabled_keeps_panel_hidden() {
        let mut sim = active_day();
        sim.config.sleep_tracking = false;
        sim.activity = ActivityMask::SLEEP;
        let mut session = HealthSession::new(sim);
        session.on_master_toggle_changed(true);

        session.refresh_sleep_visibility();

        assert!(!session.is_sleep_panel_visible());
        // the raw sleeping query still works
        assert!(session.is_sleeping());
    }

    #[test]
    fn test_teardown_persists_snapshot() {
        let mut session = HealthSession::new(active_day());
        session.on_master_toggle_changed(true);

        let sim = session.teardown();

        assert!(!sim.is_subscribed());
        assert_eq!(sim.read_string("steps").as_deref(), Some("4200"));
        assert_eq!(sim.read_string("calories").as_deref(), Some("1720 cal"));
        assert_eq!(sim.read_string("deep_sleep").as_deref(), Some("1h30m"));
    }

    #[test]
    fn test_snapshot_round_trip_across_sessions() {
        let mut session = HealthSession::new(active_day());
        session.on_master_toggle_changed(true);
        let mut sim = session.teardown();
        sim.screen = Default::default();

        let mut next = HealthSession::new(sim);
        next.on_master_toggle_changed(false);

        assert_eq!(next.platform().field(MetricKind::Sleep), Some("7h15m"));
        assert_eq!(next.platform().is_behind(MetricKind::Steps), Some(false));
    }
}
