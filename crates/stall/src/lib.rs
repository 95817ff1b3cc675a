//! Stall detection for ad playback.
//!
//! One [`StallDetector`] watches one ad attempt on one media element. It
//! consumes raw media events (`waiting`, `timeupdate`, `play`, `playing`,
//! `pause`, `ended`) and decides, through a single re-armable timeout, whether
//! playback froze.
//!
//! Race rule: a timeout is only honoured if the timeupdate counter still has
//! the value it had when the timeout was armed. Any later `waiting` or
//! timeupdate supersedes it.

mod detector;
mod settings;

pub use detector::{AdContext, StallCallback, StallDetector, StallState};
pub use settings::{
    StallSettings, DEFAULT_MAX_TIMEUPDATES, DEFAULT_STALL_TIMEOUT_MS, DEFAULT_WAITING_TIMEOUT_MS,
};
