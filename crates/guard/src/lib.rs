//! Background playback guard.
//!
//! One [`BackgroundPlaybackGuard`] per active player. On every position tick
//! it asks the hardware whether the display signal is present. While the
//! signal is gone it counts dark seconds, tells attended from unattended
//! playback by counting key presses, and schedules a single auto-pause.
//!
//! ```text
//! position tick ──► SignalProvider::signal_status().await ──► re-validate ──► account / schedule
//! signal change ──► cancel or schedule auto-pause (authoritative)
//! key press     ──► interaction counter (only past the threshold)
//! ```
//!
//! Signal query failures are treated as "connected"; the guard never pauses
//! on a guess.

mod guard;
mod provider;
mod settings;

pub use guard::{BackgroundPlaybackGuard, GuardStats};
pub use provider::{
    AlwaysConnected, PlayerControl, PlayerError, PlayerKind, SignalError, SignalProvider,
    SignalStatus,
};
pub use settings::{GuardSettings, ATTENDED_INTERACTION_LIMIT, DISCONNECTED_THRESHOLD_SECS};
