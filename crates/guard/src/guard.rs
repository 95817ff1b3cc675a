//! Background playback guard.
//!
//! Accounts for playback that keeps running while the display signal is
//! gone, and auto-pauses the player after a configurable delay.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use playsense_events::{
    emit_record, topics, AnalyticsSinkRef, BackgroundPlaybackRecord, GuardAction,
    GuardActionRecord,
};
use playsense_timer::SingleSlotTimer;
use serde::Serialize;

use crate::provider::{PlayerControl, SignalProvider, SignalStatus};
use crate::settings::{GuardSettings, ATTENDED_INTERACTION_LIMIT, DISCONNECTED_THRESHOLD_SECS};

/// Snapshot of guard accumulators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GuardStats {
    pub seconds_disconnected: u64,
    /// Dark seconds in the current disconnected stretch.
    pub stretch_seconds_disconnected: u64,
    pub seconds_with_interaction: u64,
    /// Key presses in the current disconnected stretch.
    pub interaction_attempts: u32,
    /// Key presses over the guard's lifetime.
    pub total_interaction_attempts: u32,
    pub signal_lost: bool,
    pub pause_scheduled: bool,
    pub paused_by_guard: bool,
}

struct Inner {
    settings: GuardSettings,
    player: Arc<dyn PlayerControl>,
    sink: AnalyticsSinkRef,
    stats: GuardStats,
    previous_position: Option<f64>,
    /// Bumped by every signal-change notification; a position tick whose
    /// query started under an older epoch is stale.
    signal_epoch: u64,
    threshold_reported: bool,
    pause_timer: SingleSlotTimer,
    detached: bool,
}

impl Inner {
    fn pause_permitted(&self) -> bool {
        self.settings.pause_on_signal_loss && !self.player.kind().exempt_from_auto_pause()
    }

    fn over_threshold(&self) -> bool {
        self.stats.seconds_disconnected > DISCONNECTED_THRESHOLD_SECS
    }

    /// The viewer has had time to notice this stretch's signal loss.
    fn stretch_over_threshold(&self) -> bool {
        self.stats.stretch_seconds_disconnected > DISCONNECTED_THRESHOLD_SECS
    }

    /// Close the current dark stretch and drop any pending auto-pause.
    /// Returns whether a pause was still pending.
    fn end_stretch(&mut self) -> bool {
        self.stats.signal_lost = false;
        self.stats.stretch_seconds_disconnected = 0;
        self.stats.interaction_attempts = 0;
        self.stats.pause_scheduled = false;
        self.pause_timer.cancel()
    }

    fn record(&self) -> BackgroundPlaybackRecord {
        BackgroundPlaybackRecord {
            source: self.settings.source.clone(),
            seconds_disconnected: self.stats.seconds_disconnected,
            seconds_with_interaction: self.stats.seconds_with_interaction,
            interaction_attempts: self.stats.total_interaction_attempts,
        }
    }

    fn action_record(&self, action: GuardAction) -> GuardActionRecord {
        GuardActionRecord {
            source: self.settings.source.clone(),
            action,
            seconds_disconnected: self.stats.seconds_disconnected,
        }
    }

    /// Sink to use for a record, if analytics are on.
    fn analytics(&self) -> Option<AnalyticsSinkRef> {
        self.settings
            .analytics_enabled
            .then(|| Arc::clone(&self.sink))
    }

    /// Count one second of dark playback.
    fn account_second(&mut self) -> Option<BackgroundPlaybackRecord> {
        self.stats.seconds_disconnected += 1;
        self.stats.stretch_seconds_disconnected += 1;
        if self.stats.interaction_attempts > ATTENDED_INTERACTION_LIMIT {
            self.stats.seconds_with_interaction += 1;
        }

        if !self.threshold_reported && self.over_threshold() {
            self.threshold_reported = true;
            tracing::info!(
                source = %self.settings.source,
                seconds = self.stats.seconds_disconnected,
                "background playback threshold crossed"
            );
            return Some(self.record());
        }
        None
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Watches one player for playback without a display signal.
pub struct BackgroundPlaybackGuard {
    inner: Arc<Mutex<Inner>>,
    provider: Arc<dyn SignalProvider>,
}

impl BackgroundPlaybackGuard {
    pub fn new(
        player: Arc<dyn PlayerControl>,
        provider: Arc<dyn SignalProvider>,
        settings: GuardSettings,
        sink: AnalyticsSinkRef,
    ) -> Self {
        tracing::debug!(
            source = %settings.source,
            kind = ?player.kind(),
            pause_delay_ms = settings.pause_delay_ms,
            "background playback guard attached"
        );
        Self {
            inner: Arc::new(Mutex::new(Inner {
                settings,
                player,
                sink,
                stats: GuardStats::default(),
                previous_position: None,
                signal_epoch: 0,
                threshold_reported: false,
                pause_timer: SingleSlotTimer::new("auto-pause"),
                detached: false,
            })),
            provider,
        }
    }

    /// Position heartbeat in seconds.
    ///
    /// Queries the signal, then re-validates: if a signal-change notification
    /// arrived while the query was pending, the result is discarded.
    pub async fn on_position(&self, position: f64) {
        if !position.is_finite() || position < 0.0 {
            return;
        }

        let epoch = {
            let inner = lock(&self.inner);
            if inner.detached {
                return;
            }
            inner.signal_epoch
        };

        let status = match self.provider.signal_status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "signal query failed, assuming connected");
                SignalStatus::Connected
            }
        };

        let (threshold_record, pause_now) = {
            let mut inner = lock(&self.inner);
            if inner.detached {
                return;
            }
            let previous = inner.previous_position.replace(position);

            if inner.signal_epoch != epoch {
                tracing::debug!(position, "discarding stale signal status");
                return;
            }
            if status.is_connected() {
                if inner.stats.signal_lost || inner.stats.pause_scheduled {
                    let cancelled = inner.end_stretch();
                    tracing::debug!(position, cancelled, "signal back on position tick");
                }
                return;
            }

            inner.stats.signal_lost = true;
            let advanced = previous.is_some_and(|prev| position.floor() > prev.floor());
            let threshold_record = if advanced {
                inner.account_second()
            } else {
                None
            };

            let pause_now = if !inner.stats.pause_scheduled && inner.pause_permitted() {
                self.schedule_pause(&mut inner)
            } else {
                false
            };

            (threshold_record.zip(inner.analytics()), pause_now)
        };

        if let Some((record, sink)) = threshold_record {
            emit_record(&*sink, topics::GUARD_THRESHOLD, &record);
        }
        if pause_now {
            execute_pause(&self.inner);
        }
    }

    /// Authoritative signal-change notification.
    pub fn on_signal_change(&self, connected: bool) {
        let mut inner = lock(&self.inner);
        if inner.detached {
            return;
        }
        inner.signal_epoch += 1;

        if connected {
            let was_lost = inner.stats.signal_lost;
            let cancelled = inner.end_stretch();

            let resume = inner.stats.paused_by_guard && inner.player.kind().resumes_on_reconnect();
            inner.stats.paused_by_guard = false;

            tracing::debug!(was_lost, cancelled, resume, "signal reconnected");
            if resume {
                let player = Arc::clone(&inner.player);
                let analytics = inner.analytics();
                let record = inner.action_record(GuardAction::Resumed);
                drop(inner);
                resume_player(&*player, analytics, record);
            }
        } else {
            inner.stats.signal_lost = true;
            tracing::debug!(source = %inner.settings.source, "signal lost");

            let pause_now = !inner.stats.pause_scheduled
                && inner.pause_permitted()
                && self.schedule_pause(&mut inner);
            drop(inner);

            if pause_now {
                execute_pause(&self.inner);
            }
        }
    }

    /// Key press from the filtered input stream.
    ///
    /// Presses only count once the current dark stretch has run past the
    /// threshold; earlier presses cannot be blamed on the viewer noticing.
    pub fn on_key_press(&self) {
        let mut inner = lock(&self.inner);
        if inner.detached || !inner.stats.signal_lost || !inner.stretch_over_threshold() {
            return;
        }
        inner.stats.interaction_attempts = inner.stats.interaction_attempts.saturating_add(1);
        inner.stats.total_interaction_attempts =
            inner.stats.total_interaction_attempts.saturating_add(1);
        tracing::debug!(
            attempts = inner.stats.interaction_attempts,
            "key press during background playback"
        );
    }

    pub fn stats(&self) -> GuardStats {
        lock(&self.inner).stats.clone()
    }

    /// Detach from the player: cancel any pending pause and emit the summary
    /// if dark playback ran past the threshold. Calling it twice is a no-op.
    pub fn teardown(&self) {
        let summary = {
            let mut inner = lock(&self.inner);
            if inner.detached {
                return;
            }
            inner.detached = true;
            inner.pause_timer.cancel();
            inner.stats.pause_scheduled = false;

            tracing::info!(
                source = %inner.settings.source,
                seconds_disconnected = inner.stats.seconds_disconnected,
                "background playback guard detached"
            );

            if inner.over_threshold() {
                inner.analytics().map(|sink| (inner.record(), sink))
            } else {
                None
            }
        };

        if let Some((record, sink)) = summary {
            emit_record(&*sink, topics::GUARD_SUMMARY, &record);
        }
    }

    /// Mark a pause as scheduled. Returns true when the delay is zero and the
    /// caller must pause right away, after releasing the lock.
    fn schedule_pause(&self, inner: &mut Inner) -> bool {
        inner.stats.pause_scheduled = true;
        let delay = inner.settings.pause_delay();
        if delay.is_zero() {
            return true;
        }

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        inner.pause_timer.arm(delay, move || {
            if let Some(inner) = weak.upgrade() {
                execute_pause(&inner);
            }
        });
        tracing::debug!(?delay, "auto-pause scheduled");
        false
    }
}

/// Pause the player if the motivating condition still holds.
fn execute_pause(inner: &Mutex<Inner>) {
    let (player, analytics, record) = {
        let mut inner = lock(inner);
        let stats = &inner.stats;
        if inner.detached || !stats.signal_lost || !stats.pause_scheduled || stats.paused_by_guard {
            return;
        }
        inner.stats.paused_by_guard = true;
        (
            Arc::clone(&inner.player),
            inner.analytics(),
            inner.action_record(GuardAction::AutoPaused),
        )
    };

    match player.pause() {
        Ok(()) => {
            tracing::info!(
                source = %record.source,
                seconds_disconnected = record.seconds_disconnected,
                "auto-paused background playback"
            );
            if let Some(sink) = analytics {
                emit_record(&*sink, topics::GUARD_AUTO_PAUSED, &record);
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "auto-pause failed");
            // Let the next dark tick try again
            let mut inner = lock(inner);
            inner.stats.paused_by_guard = false;
            inner.stats.pause_scheduled = false;
        }
    }
}

fn resume_player(
    player: &dyn PlayerControl,
    analytics: Option<AnalyticsSinkRef>,
    record: GuardActionRecord,
) {
    match player.resume() {
        Ok(()) => {
            tracing::info!(source = %record.source, "resumed after reconnect");
            if let Some(sink) = analytics {
                emit_record(&*sink, topics::GUARD_RESUMED, &record);
            }
        }
        Err(e) => tracing::warn!(error = %e, "resume after reconnect failed"),
    }
}

impl std::fmt::Debug for BackgroundPlaybackGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("BackgroundPlaybackGuard")
            .field("settings", &inner.settings)
            .field("stats", &inner.stats)
            .field("detached", &inner.detached)
            .finish_non_exhaustive()
    }
}
