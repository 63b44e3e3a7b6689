//! Coalescing update scheduler
//!
//! Health events, sleep transitions and configuration changes all ask for a
//! metric refresh. Only "is a refresh due" matters, so requests collapse into a
//! single pending flag that the tick consumer takes before running a pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

/// Single-slot pending flag
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    pending: Arc<AtomicBool>,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a refresh as due. Repeated calls before the next pass collapse.
    pub fn request_update(&self) {
        debug!("Queued health update");
        self.pending.store(true, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Clear the flag and report whether it was set.
    ///
    /// Called before a pass starts so that a request arriving during the pass
    /// leaves the flag set for the next one.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Handle that event sources can hold on to
    pub fn trigger(&self) -> UpdateTrigger {
        UpdateTrigger {
            pending: Arc::clone(&self.pending),
        }
    }
}

/// Cloneable request-only view of an [`UpdateScheduler`]
#[derive(Debug, Clone)]
pub struct UpdateTrigger {
    pending: Arc<AtomicBool>,
}

impl UpdateTrigger {
    pub fn request_update(&self) {
        debug!("Queued health update from trigger");
        self.pending.store(true, Ordering::Release);
    }
}
