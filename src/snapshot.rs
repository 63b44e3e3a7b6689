//! Display snapshot persistence
//!
//! The last formatted text of every module is written to durable storage when
//! the watchface is torn down, and shown again on the next cold start until a
//! live aggregation pass replaces it. The text is display-only; nothing ever
//! parses a number back out of it.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::platform::{Display, Persistence};
use crate::types::{bounded_text, MetricKind};

/// Formatted text of the five modules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub steps: String,
    pub distance: String,
    pub calories: String,
    pub sleep: String,
    pub deep_sleep: String,
}

impl Snapshot {
    pub fn get(&self, kind: MetricKind) -> &str {
        match kind {
            MetricKind::Steps => &self.steps,
            MetricKind::Distance => &self.distance,
            MetricKind::Calories => &self.calories,
            MetricKind::Sleep => &self.sleep,
            MetricKind::DeepSleep => &self.deep_sleep,
        }
    }

    pub fn set(&mut self, kind: MetricKind, text: &str) {
        let slot = match kind {
            MetricKind::Steps => &mut self.steps,
            MetricKind::Distance => &mut self.distance,
            MetricKind::Calories => &mut self.calories,
            MetricKind::Sleep => &mut self.sleep,
            MetricKind::DeepSleep => &mut self.deep_sleep,
        };
        *slot = bounded_text(text);
    }

    /// Write every module's text, keyed by module name
    pub fn save<P: Persistence + ?Sized>(&self, storage: &mut P) {
        debug!("Storing health data");
        for kind in MetricKind::ALL {
            storage.write_string(kind.as_str(), self.get(kind));
        }
    }

    /// Read stored text for the enabled modules and show it with a neutral colour.
    ///
    /// Missing keys leave the field blank.
    pub fn load<S, F>(&mut self, platform: &mut S, enabled: F)
    where
        S: Persistence + Display + ?Sized,
        F: Fn(MetricKind) -> bool,
    {
        debug!("Loading health data from storage");
        for kind in MetricKind::ALL.into_iter().filter(|k| enabled(*k)) {
            let text = platform.read_string(kind.as_str()).unwrap_or_default();
            self.set(kind, &text);
            platform.set_field_text(kind, self.get(kind));
            platform.set_trend_color(kind, false);
        }
    }
}
