//! Guard configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Disconnected seconds after which background playback is reported and key
/// presses count as interaction.
pub const DISCONNECTED_THRESHOLD_SECS: u64 = 5;

/// Key presses in one disconnected stretch above which the viewer is taken to
/// be present.
pub const ATTENDED_INTERACTION_LIMIT: u32 = 2;

/// Per-player guard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    /// Label attached to every record (e.g. "live", "vod").
    pub source: String,
    /// Delay between signal loss and auto-pause; 0 pauses immediately.
    pub pause_delay_ms: u64,
    pub analytics_enabled: bool,
    /// When false the guard only accounts, it never pauses.
    pub pause_on_signal_loss: bool,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            source: "player".to_string(),
            pause_delay_ms: 0,
            analytics_enabled: true,
            pause_on_signal_loss: true,
        }
    }
}

impl GuardSettings {
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn pause_delay(&self) -> Duration {
        Duration::from_millis(self.pause_delay_ms)
    }
}
