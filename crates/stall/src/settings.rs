//! Stall detection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default wait after `waiting` with no progress at all.
pub const DEFAULT_WAITING_TIMEOUT_MS: u64 = 6000;

/// Default wait after a timeupdate that arrived while `waiting`.
pub const DEFAULT_STALL_TIMEOUT_MS: u64 = 2500;

/// Default number of timeupdates after `waiting` that keep re-arming.
pub const DEFAULT_MAX_TIMEUPDATES: u8 = 5;

/// Timing thresholds for one stall detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StallSettings {
    /// Timeout armed on `waiting`.
    pub waiting_timeout_ms: u64,
    /// Timeout re-armed on each timeupdate while `waiting`.
    pub stall_timeout_ms: u64,
    /// Cap on the timeupdate counter.
    pub max_timeupdates: u8,
}

impl Default for StallSettings {
    fn default() -> Self {
        Self {
            waiting_timeout_ms: DEFAULT_WAITING_TIMEOUT_MS,
            stall_timeout_ms: DEFAULT_STALL_TIMEOUT_MS,
            max_timeupdates: DEFAULT_MAX_TIMEUPDATES,
        }
    }
}

impl StallSettings {
    pub fn waiting_timeout(&self) -> Duration {
        Duration::from_millis(self.waiting_timeout_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}
