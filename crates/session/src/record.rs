//! Viewing-session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stage::Stage;

/// Why playback was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseCause {
    /// Viewer pressed pause.
    User,
    /// Paused because the display signal was lost.
    BackgroundPlayback,
    /// Paused by the host while an ad break is handled.
    Ad,
    System,
}

impl PauseCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseCause::User => "user",
            PauseCause::BackgroundPlayback => "background_playback",
            PauseCause::Ad => "ad",
            PauseCause::System => "system",
        }
    }
}

/// Why the session ended without the viewer leaving on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassiveExitCause {
    /// The stream expired and the page reloaded itself.
    ExpiredReload,
}

impl PassiveExitCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassiveExitCause::ExpiredReload => "expired_reload",
        }
    }
}

/// Presentation mode requested by the player chrome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FullscreenMode {
    /// Small banner/preview window.
    Banner,
    /// Regular fullscreen playback.
    Default,
}

/// Last playback error reported to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

impl PlaybackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// State of one viewing session.
///
/// A new session always gets a brand-new record; fields are never cleared in
/// place. All durations are whole seconds of counted position ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub stage: Stage,
    pub started_at: Option<DateTime<Utc>>,

    pub preview_secs: u64,
    pub epg_secs: u64,
    pub fullscreen_secs: u64,
    /// Fullscreen seconds since the last playback start; drives the early window.
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
    /// Sticky: viewer came back to a channel seen earlier.
    pub revisit: bool,
    /// Sticky: viewer dismissed the guide while fullscreen.
    pub deliberate: bool,
    pub error_modal_visible: bool,
    pub error_modal_resolved: bool,

    pub error_modal_shown_at: Option<DateTime<Utc>>,
    pub last_error: Option<PlaybackError>,
    pub pause_cause: Option<PauseCause>,
    pub passive_exit: Option<PassiveExitCause>,

    /// Floored position of the last accepted tick.
    #[serde(skip)]
    pub(crate) last_position_secs: Option<u64>,
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            stage: Stage::Idle,
            started_at: None,
            preview_secs: 0,
            epg_secs: 0,
            fullscreen_secs: 0,
            fullscreen_since_start_secs: 0,
            stall_secs: 0,
            ads_seen: 0,
            error_modal_shows: 0,
            stall_count: 0,
            paused: false,
            preview: false,
            epg_visible: false,
            fullscreen: false,
            ad_active: false,
            buffering: false,
            revisit: false,
            deliberate: false,
            error_modal_visible: false,
            error_modal_resolved: false,
            error_modal_shown_at: None,
            last_error: None,
            pause_cause: None,
            passive_exit: None,
            last_position_secs: None,
        }
    }
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh record stamped with the current time.
    pub fn started_now() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Total counted seconds across all presentation modes.
    pub fn watched_secs(&self) -> u64 {
        self.preview_secs + self.epg_secs + self.fullscreen_secs
    }

    /// Count one tick at `position` seconds.
    ///
    /// A report counts when its floored value moves past the cached one
    /// (zero before the first report), so fractional repeats and backward
    /// seeks never add time. Returns whether a tick was counted.
    pub(crate) fn count_tick(&mut self, position: f64) -> bool {
        let floored = position.floor() as u64;
        let previous = self.last_position_secs.replace(floored).unwrap_or(0);
        if floored <= previous {
            return false;
        }

        if self.preview {
            self.preview_secs += 1;
        } else if self.epg_visible {
            self.epg_secs += 1;
        } else {
            self.fullscreen_secs += 1;
            self.fullscreen_since_start_secs += 1;
        }
        true
    }
}
