//! Sleep state tracking
//!
//! Decides whether the sleep panel should be on screen. The wearer's activity
//! is sampled at most once per 10-minute wall-clock bucket and cached in
//! between. After waking, sleep data stays visible for a 30 minute grace
//! window so noisy minute-to-minute classification does not make it flicker.
//!
//! ```text
//! Awake --sleep bit--> Asleep --no sleep bit--> RecentlyWoken --grace over--> Awake
//! ```

use chrono::{DateTime, Duration, FixedOffset};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::platform::HealthService;

/// Minutes covered by one activity sample
pub const SAMPLE_BUCKET_MINUTES: i64 = 10;

/// How long sleep data stays visible after waking
pub const WAKE_GRACE_SECONDS: i64 = 30 * 60;

/// Observable phase of the sleep state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepPhase {
    Awake,
    Asleep,
    /// Awake, but still inside the grace window
    RecentlyWoken,
}

/// Follow-up work a transition asks the session to do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SleepEffects {
    pub request_update: bool,
    pub request_redraw: bool,
}

/// Mutable sleep tracking state, kept in memory for the session only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SleepState {
    /// Cached result of the last activity sample
    pub is_sleeping: bool,
    pub was_asleep: bool,
    /// End of the post-wake grace window
    pub woke_up_at: Option<DateTime<FixedOffset>>,
    pub data_visible: bool,
    /// Local 10-minute bucket of the last activity sample
    pub last_sampled_bucket: Option<i64>,
}

/// Debounced sleep/wake state machine
#[derive(Debug, Clone, Default)]
pub struct SleepStateMachine {
    state: SleepState,
}

/// Local wall-clock 10-minute bucket containing `now`
pub fn minute_bucket(now: DateTime<FixedOffset>) -> i64 {
    let local_seconds = now.timestamp() + i64::from(now.offset().local_minus_utc());
    local_seconds.div_euclid(SAMPLE_BUCKET_MINUTES * 60)
}

impl SleepStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start of a watchface session: nothing asleep, nothing shown
    pub fn init(&mut self) {
        self.state.was_asleep = false;
        self.state.data_visible = false;
    }

    /// Forget the cached sample so the next query goes to the platform
    pub fn reset_sample(&mut self) {
        self.state.is_sleeping = false;
        self.state.last_sampled_bucket = None;
    }

    pub fn state(&self) -> &SleepState {
        &self.state
    }

    pub fn is_visible(&self) -> bool {
        self.state.data_visible
    }

    pub fn phase(&self) -> SleepPhase {
        if self.state.was_asleep {
            SleepPhase::Asleep
        } else if self.state.data_visible && self.state.woke_up_at.is_some() {
            SleepPhase::RecentlyWoken
        } else {
            SleepPhase::Awake
        }
    }

    /// Whether the wearer is asleep, querying the platform at most once per bucket
    pub fn sample<H: HealthService + ?Sized>(
        &mut self,
        now: DateTime<FixedOffset>,
        health: &H,
    ) -> bool {
        let bucket = minute_bucket(now);
        if self.state.last_sampled_bucket != Some(bucket) {
            self.state.last_sampled_bucket = Some(bucket);
            let activities = health.peek_current_activity();
            self.state.is_sleeping = activities.is_sleeping();
            debug!(
                "Sleeping data. {:?} -> {}",
                activities, self.state.is_sleeping
            );
        }
        self.state.is_sleeping
    }

    /// Advance the state machine and report what the session should do
    pub fn refresh<H: HealthService + ?Sized>(
        &mut self,
        now: DateTime<FixedOffset>,
        health: &H,
    ) -> SleepEffects {
        let mut effects = SleepEffects::default();
        let sleeping = self.sample(now, health);

        if sleeping {
            self.state.data_visible = true;
            if !self.state.was_asleep {
                self.state.was_asleep = true;
                self.state.woke_up_at = None;
                effects.request_update = true;
                effects.request_redraw = true;
                debug!("Just went to sleep");
            }
        } else if self.state.was_asleep {
            let until = now + Duration::seconds(WAKE_GRACE_SECONDS);
            self.state.data_visible = true;
            self.state.woke_up_at = Some(until);
            self.state.was_asleep = false;
            effects.request_update = true;
            debug!("Woke up, keeping sleep data until {until}");
        }

        if let Some(until) = self.state.woke_up_at {
            if self.state.data_visible && now > until {
                debug!("Past grace window after waking: {now} > {until}");
                self.state.data_visible = false;
                self.state.woke_up_at = None;
                effects.request_update = true;
                effects.request_redraw = true;
            }
        }

        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedPlatform;
    use crate::types::ActivityMask;

    fn sim_at(rfc3339: &str) -> SimulatedPlatform {
        SimulatedPlatform::at(rfc3339).unwrap()
    }

    #[test]
    fn test_buckets_follow_local_wall_clock() {
        let a = DateTime::parse_from_rfc3339("2024-01-15T23:10:00+05:30").unwrap();
        let b = DateTime::parse_from_rfc3339("2024-01-15T23:19:59+05:30").unwrap();
        let c = DateTime::parse_from_rfc3339("2024-01-15T23:20:00+05:30").unwrap();
        assert_eq!(minute_bucket(a), minute_bucket(b));
        assert_eq!(minute_bucket(c), minute_bucket(a) + 1);
    }

    #[test]
    fn test_sampling_is_rate_limited_per_bucket() {
        let mut sim = sim_at("2024-01-15T02:01:00Z");
        sim.activity = ActivityMask::SLEEP;
        let mut machine = SleepStateMachine::new();

        assert!(machine.sample(sim.now, &sim));
        sim.activity = ActivityMask::empty();
        sim.advance(Duration::minutes(5)).unwrap();
        // same bucket: cached answer, no second query
        assert!(machine.sample(sim.now, &sim));
        assert_eq!(sim.activity_query_count(), 1);

        sim.advance(Duration::minutes(5)).unwrap();
        assert!(!machine.sample(sim.now, &sim));
        assert_eq!(sim.activity_query_count(), 2);
    }

    #[test]
    fn test_falling_asleep_transitions_once() {
        let mut sim = sim_at("2024-01-15T00:00:00Z");
        sim.activity = ActivityMask::RESTFUL_SLEEP;
        let mut machine = SleepStateMachine::new();
        machine.init();

        let first = machine.refresh(sim.now, &sim);
        assert_eq!(
            first,
            SleepEffects {
                request_update: true,
                request_redraw: true
            }
        );
        assert_eq!(machine.phase(), SleepPhase::Asleep);
        assert!(machine.is_visible());

        for _ in 0..6 {
            sim.advance(Duration::minutes(10)).unwrap();
            assert_eq!(machine.refresh(sim.now, &sim), SleepEffects::default());
        }
        assert!(machine.state().was_asleep);
    }

    #[test]
    fn test_grace_window_after_waking() {
        let mut sim = sim_at("2024-01-15T06:00:00Z");
        sim.activity = ActivityMask::SLEEP;
        let mut machine = SleepStateMachine::new();
        machine.refresh(sim.now, &sim);

        sim.activity = ActivityMask::WALK;
        sim.advance(Duration::minutes(10)).unwrap();
        let woke_at = sim.now;
        let effects = machine.refresh(sim.now, &sim);
        assert!(effects.request_update);
        assert!(!effects.request_redraw);
        assert_eq!(machine.phase(), SleepPhase::RecentlyWoken);
        assert_eq!(
            machine.state().woke_up_at,
            Some(woke_at + Duration::seconds(1800))
        );

        // exactly at the deadline: still visible
        sim.advance(Duration::minutes(30)).unwrap();
        machine.refresh(sim.now, &sim);
        assert!(machine.is_visible());

        sim.advance(Duration::seconds(1)).unwrap();
        let effects = machine.refresh(sim.now, &sim);
        assert!(effects.request_redraw);
        assert!(effects.request_update);
        assert!(!machine.is_visible());
        assert_eq!(machine.phase(), SleepPhase::Awake);

        // nothing left to do afterwards
        sim.advance(Duration::minutes(10)).unwrap();
        assert_eq!(machine.refresh(sim.now, &sim), SleepEffects::default());
    }

    #[test]
    fn test_falling_back_asleep_cancels_grace_window() {
        let mut sim = sim_at("2024-01-15T06:00:00Z");
        sim.activity = ActivityMask::SLEEP;
        let mut machine = SleepStateMachine::new();
        machine.refresh(sim.now, &sim);

        sim.activity = ActivityMask::empty();
        sim.advance(Duration::minutes(10)).unwrap();
        machine.refresh(sim.now, &sim);
        assert_eq!(machine.phase(), SleepPhase::RecentlyWoken);

        sim.activity = ActivityMask::SLEEP;
        sim.advance(Duration::minutes(10)).unwrap();
        let effects = machine.refresh(sim.now, &sim);
        assert!(effects.request_redraw);
        assert_eq!(machine.phase(), SleepPhase::Asleep);
        assert_eq!(machine.state().woke_up_at, None);

        sim.advance(Duration::hours(2)).unwrap();
        machine.refresh(sim.now, &sim);
        assert!(machine.is_visible());
    }

    #[test]
    fn test_reset_sample_forces_new_query() {
        let sim = sim_at("2024-01-15T06:00:00Z");
        let mut machine = SleepStateMachine::new();
        machine.sample(sim.now, &sim);
        machine.reset_sample();
        machine.sample(sim.now, &sim);
        assert_eq!(sim.activity_query_count(), 2);
    }
}
