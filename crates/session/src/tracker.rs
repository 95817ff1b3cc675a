//! Session stage tracker.
//!
//! Owned by the playback orchestration layer. Every semantic playback event
//! goes through one of the methods below; the tracker folds it into the
//! current `SessionRecord` and re-resolves the stage.

use chrono::Utc;
use playsense_events::{emit_record, topics, AnalyticsSinkRef, SessionSummary};

use crate::record::{FullscreenMode, PassiveExitCause, PauseCause, PlaybackError, SessionRecord};
use crate::stage::{resolve_stage, Stage};

/// Tracks the stage and duration accumulators of the current viewing session.
pub struct SessionStageTracker {
    record: SessionRecord,
    sink: AnalyticsSinkRef,
}

impl SessionStageTracker {
    /// Create a tracker with a freshly started session.
    pub fn new(sink: AnalyticsSinkRef) -> Self {
        Self {
            record: SessionRecord::started_now(),
            sink,
        }
    }

    /// Start a new session, replacing the current record.
    pub fn start(&mut self) -> &SessionRecord {
        self.record = SessionRecord::started_now();
        tracing::info!(session_id = %self.record.session_id, "session started");
        &self.record
    }

    /// Alias for [`start`](Self::start).
    pub fn reset(&mut self) -> &SessionRecord {
        self.start()
    }

    /// Read-only view of the current record.
    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn stage(&self) -> Stage {
        self.record.stage
    }

    pub fn mark_ready(&mut self) {
        self.set_stage(Stage::Ready, "ready");
    }

    /// Position heartbeat in seconds.
    ///
    /// Non-finite or non-positive positions are ignored entirely. A tick
    /// while paused is treated as the resume signal.
    pub fn position(&mut self, position: f64) {
        if !position.is_finite() || position <= 0.0 {
            return;
        }

        if self.record.paused {
            self.record.paused = false;
            self.record.pause_cause = None;
        }

        self.record.count_tick(position);
        self.evaluate();
    }

    pub fn ad_start(&mut self) {
        self.record.ad_active = true;
        self.record.ads_seen = self.record.ads_seen.saturating_add(1);
        self.evaluate();
    }

    pub fn ad_complete(&mut self) {
        self.record.ad_active = false;
        self.evaluate();
    }

    /// Pause always wins, whatever else is going on.
    pub fn set_paused(&mut self, cause: PauseCause) {
        self.record.paused = true;
        self.record.pause_cause = Some(cause);
        self.set_stage(Stage::Paused, "set_paused");
    }

    pub fn set_fullscreen(&mut self, mode: FullscreenMode) {
        match mode {
            FullscreenMode::Banner => {
                self.record.fullscreen = false;
                self.record.epg_visible = false;
                self.record.preview = true;
            }
            FullscreenMode::Default => {
                self.record.preview = false;
                self.record.fullscreen = true;
            }
        }
        self.evaluate();
    }

    /// Show or hide the programme guide.
    ///
    /// Dismissing the guide while fullscreen marks the session as deliberate;
    /// that flag is never cleared.
    pub fn set_epg_visible(&mut self, visible: bool) {
        let hiding = self.record.epg_visible && !visible;
        if hiding && self.record.fullscreen {
            self.record.deliberate = true;
        }
        self.record.epg_visible = visible;
        self.evaluate();
    }

    pub fn show_error_modal(&mut self) {
        self.record.error_modal_visible = true;
        self.record.error_modal_shows = self.record.error_modal_shows.saturating_add(1);
        self.record.fullscreen_since_start_secs = 0;
        self.record.error_modal_shown_at = Some(Utc::now());
        self.evaluate();
    }

    /// Dismissing the modal counts as a fresh playback start.
    pub fn hide_error_modal(&mut self) {
        self.record.error_modal_visible = false;
        self.record.fullscreen_since_start_secs = 0;
        self.record.error_modal_shown_at = None;
        self.evaluate();
    }

    pub fn record_error(&mut self, error: PlaybackError) {
        tracing::debug!(error = %error, "playback error recorded");
        self.record.last_error = Some(error);
    }

    /// Add one stall of `duration_secs` seconds. Invalid durations are dropped.
    pub fn record_stall(&mut self, duration_secs: f64) {
        if !duration_secs.is_finite() || duration_secs < 0.0 {
            tracing::debug!(duration_secs, "ignoring invalid stall duration");
            return;
        }
        self.record.stall_secs = self
            .record
            .stall_secs
            .saturating_add(duration_secs.round() as u64);
        self.record.stall_count = self.record.stall_count.saturating_add(1);
    }

    pub fn mark_revisit(&mut self) {
        self.record.revisit = true;
    }

    pub fn mark_expired_reload(&mut self) {
        self.record.passive_exit = Some(PassiveExitCause::ExpiredReload);
    }

    pub fn set_buffering(&mut self, buffering: bool) {
        self.record.buffering = buffering;
    }

    /// Flatten the current record, hand it to the analytics sink and return it.
    pub fn end_session(&mut self) -> SessionSummary {
        let summary = summarize(&self.record);
        tracing::info!(
            session_id = %summary.session_id,
            stage = %summary.stage,
            watched_secs = self.record.watched_secs(),
            "session ended"
        );
        emit_record(&*self.sink, topics::SESSION_SUMMARY, &summary);
        summary
    }

    fn evaluate(&mut self) {
        let previous = self.record.stage;
        let (next, rule) = resolve_stage(&mut self.record);
        if next != previous {
            tracing::debug!(from = %previous, to = %next, rule, "stage changed");
        }
    }

    fn set_stage(&mut self, stage: Stage, reason: &'static str) {
        let previous = self.record.stage;
        self.record.stage = stage;
        if stage != previous {
            tracing::debug!(from = %previous, to = %stage, reason, "stage changed");
        }
    }
}

impl std::fmt::Debug for SessionStageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStageTracker")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

fn summarize(record: &SessionRecord) -> SessionSummary {
    SessionSummary {
        session_id: record.session_id.to_string(),
        stage: record.stage.label().to_string(),
        started_at_ms: record.started_at.map(|t| t.timestamp_millis()),
        preview_secs: record.preview_secs,
        epg_secs: record.epg_secs,
        fullscreen_secs: record.fullscreen_secs,
        fullscreen_since_start_secs: record.fullscreen_since_start_secs,
        stall_secs: record.stall_secs,
        ads_seen: record.ads_seen,
        error_modal_shows: record.error_modal_shows,
        stall_count: record.stall_count,
        paused: record.paused,
        preview: record.preview,
        epg_visible: record.epg_visible,
        fullscreen: record.fullscreen,
        ad_active: record.ad_active,
        buffering: record.buffering,
        revisit: record.revisit,
        deliberate: record.deliberate,
        error_modal_visible: record.error_modal_visible,
        error_modal_resolved: record.error_modal_resolved,
        pause_cause: record.pause_cause.map(|c| c.as_str().to_string()),
        passive_exit: record.passive_exit.map(|c| c.as_str().to_string()),
        last_error: record.last_error.as_ref().map(|e| e.to_string()),
    }
}
