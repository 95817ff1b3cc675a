//! Shared telemetry contracts for the playback trackers.
//!
//! This crate defines the flat records that trackers hand to the analytics
//! pipeline at session end, ad end and disconnect end. Downstream dashboards
//! key on these field names, so every tracker serializes through these types
//! rather than building ad-hoc JSON.
//!
//! Also provides the `AnalyticsSink` trait for decoupled emission.

mod sink;

pub use sink::{
    emit_record, AnalyticsSink, AnalyticsSinkRef, EmittedRecord, InMemoryAnalyticsSink,
    NullAnalyticsSink, SinkError, TracingAnalyticsSink,
};

use serde::{Deserialize, Serialize};

/// Final state of one viewing session.
///
/// Producers: session tracker (`end_session`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    /// Stage name at flush time (e.g. "IN_STREAM").
    pub stage: String,
    #[serde(default)]
    pub started_at_ms: Option<i64>,

    pub preview_secs: u64,
    pub epg_secs: u64,
    pub fullscreen_secs: u64,
    pub fullscreen_since_start_secs: u64,
    pub stall_secs: u64,

    pub ads_seen: u32,
    pub error_modal_shows: u32,
    pub stall_count: u32,

    pub paused: bool,
    pub preview: bool,
    pub epg_visible: bool,
    pub fullscreen: bool,
    pub ad_active: bool,
    pub buffering: bool,
    pub revisit: bool,
    pub deliberate: bool,
    pub error_modal_visible: bool,
    pub error_modal_resolved: bool,

    #[serde(default)]
    pub pause_cause: Option<String>,
    #[serde(default)]
    pub passive_exit: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Emitted the moment an ad attempt is judged stalled.
///
/// Producers: stall detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdStallRecord {
    pub ad_id: String,
    pub element_id: String,
    /// Timeupdates observed since the last `waiting`.
    pub timeupdate_count: u8,
    /// Time since the last timeupdate, excluding intentional pauses.
    #[serde(default)]
    pub lag_ms: Option<u64>,
    pub stall_count: u32,
}

/// Emitted when an ad attempt is detached.
///
/// Producers: stall detector (`detach`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdPlaybackRecord {
    pub ad_id: String,
    pub element_id: String,
    pub stall_detected: bool,
    pub stall_count: u32,
    pub ended: bool,
}

/// Background-playback accumulators for one player.
///
/// Producers: background playback guard (threshold crossing, teardown)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundPlaybackRecord {
    pub source: String,
    pub seconds_disconnected: u64,
    /// Seconds played dark while the viewer was pressing keys.
    pub seconds_with_interaction: u64,
    pub interaction_attempts: u32,
}

/// Action taken by the background playback guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardAction {
    AutoPaused,
    Resumed,
}

/// Emitted when the guard pauses or resumes its player.
///
/// Producers: background playback guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardActionRecord {
    pub source: String,
    pub action: GuardAction,
    pub seconds_disconnected: u64,
}

/// Record topics as constants to prevent typos.
pub mod topics {
    /// Session summary at session end.
    pub const SESSION_SUMMARY: &str = "session:summary";
    /// Stall detected during an ad attempt.
    pub const AD_STALL: &str = "ad:stall";
    /// Ad attempt detached.
    pub const AD_END: &str = "ad:end";
    /// Disconnected time crossed the reporting threshold.
    pub const GUARD_THRESHOLD: &str = "guard:threshold";
    /// Guard paused its player.
    pub const GUARD_AUTO_PAUSED: &str = "guard:auto_paused";
    /// Guard resumed its player after reconnect.
    pub const GUARD_RESUMED: &str = "guard:resumed";
    /// Guard teardown summary.
    pub const GUARD_SUMMARY: &str = "guard:summary";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_record_deserialize() {
        let json = r#"{"source": "live", "seconds_disconnected": 12,
            "seconds_with_interaction": 3, "interaction_attempts": 4}"#;
        let record: BackgroundPlaybackRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.source, "live");
        assert_eq!(record.seconds_disconnected, 12);
        assert_eq!(record.interaction_attempts, 4);
    }

    #[test]
    fn test_guard_action_serializes_snake_case() {
        let record = GuardActionRecord {
            source: "live".to_string(),
            action: GuardAction::AutoPaused,
            seconds_disconnected: 6,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["action"], "auto_paused");
    }

    #[test]
    fn test_ad_stall_record_minimal() {
        let json = r#"{"ad_id": "a1", "element_id": "video", "timeupdate_count": 2,
            "stall_count": 1}"#;
        let record: AdStallRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.lag_ms, None);
    }
}
