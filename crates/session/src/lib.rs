//! Viewing-session stage tracking.
//!
//! Resolves a noisy stream of semantic playback events (ready, ads, pause,
//! fullscreen and guide toggles, position heartbeats, error modals) into one
//! current [`Stage`] plus whole-second duration accumulators.
//!
//! # Example
//!
//! ```ignore
//! use playsense_events::TracingAnalyticsSink;
//! use playsense_session::{FullscreenMode, SessionStageTracker};
//! use std::sync::Arc;
//!
//! let mut tracker = SessionStageTracker::new(Arc::new(TracingAnalyticsSink));
//! tracker.mark_ready();
//! tracker.set_fullscreen(FullscreenMode::Default);
//! tracker.position(1.0);
//! let summary = tracker.end_session();
//! ```

mod record;
mod stage;
mod tracker;

pub use record::{FullscreenMode, PassiveExitCause, PauseCause, PlaybackError, SessionRecord};
pub use stage::{resolve_stage, Stage, StageRule, EARLY_START_GAP_SECONDS, STAGE_RULES};
pub use tracker::SessionStageTracker;
