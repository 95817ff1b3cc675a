//! Stall detector for one ad playback attempt.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use playsense_events::{
    emit_record, topics, AdPlaybackRecord, AdStallRecord, AnalyticsSinkRef,
};
use playsense_timer::SingleSlotTimer;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::settings::StallSettings;

/// Identifies the ad attempt and the media element it plays on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdContext {
    pub ad_id: String,
    pub element_id: String,
}

impl AdContext {
    pub fn new(ad_id: impl Into<String>, element_id: impl Into<String>) -> Self {
        Self {
            ad_id: ad_id.into(),
            element_id: element_id.into(),
        }
    }
}

/// Callback invoked when a stall is detected.
pub type StallCallback = Arc<dyn Fn(AdStallRecord) + Send + Sync + 'static>;

/// Snapshot of detector state.
#[derive(Debug, Clone, Default)]
pub struct StallState {
    pub waiting: bool,
    pub paused: bool,
    pub ended: bool,
    /// Timeupdates seen since the last `waiting`, capped by settings.
    pub timeupdate_count: u8,
    pub last_timeupdate: Option<Instant>,
    pub last_pause: Option<Instant>,
    /// Sticky until `playing`.
    pub stall_detected: bool,
    /// Stalls detected over the detector's lifetime.
    pub stall_count: u32,
}

impl StallState {
    /// Time since the last timeupdate, minus the part of it spent in an
    /// ongoing intentional pause.
    pub fn lag_at(&self, now: Instant) -> Option<Duration> {
        let last = self.last_timeupdate?;
        let lag = now.saturating_duration_since(last);

        match (self.paused, self.last_pause) {
            (true, Some(paused_at)) => {
                let paused_for = now.saturating_duration_since(paused_at.max(last));
                Some(lag.saturating_sub(paused_for))
            }
            _ => Some(lag),
        }
    }
}

struct Inner {
    ad: AdContext,
    settings: StallSettings,
    sink: AnalyticsSinkRef,
    on_stall: Option<StallCallback>,
    state: StallState,
    timer: SingleSlotTimer,
    /// Bumped on every arm; a firing from an older arm is void.
    generation: u64,
    detached: bool,
}

/// Watches raw media events of one ad attempt for stalls.
///
/// All event methods are cheap and never block on the timer; the timeouts
/// run on the ambient tokio runtime.
pub struct StallDetector {
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StallDetector {
    /// Create a detector. `on_stall` runs at most once for this instance.
    pub fn new(
        ad: AdContext,
        settings: StallSettings,
        sink: AnalyticsSinkRef,
        on_stall: StallCallback,
    ) -> Self {
        tracing::debug!(ad_id = %ad.ad_id, element_id = %ad.element_id, "stall detector attached");
        Self {
            inner: Arc::new(Mutex::new(Inner {
                ad,
                settings,
                sink,
                on_stall: Some(on_stall),
                state: StallState::default(),
                timer: SingleSlotTimer::new("stall"),
                generation: 0,
                detached: false,
            })),
        }
    }

    pub fn on_waiting(&self) {
        let mut inner = lock(&self.inner);
        if inner.detached {
            return;
        }
        inner.state.waiting = true;
        inner.state.timeupdate_count = 0;

        let delay = inner.settings.waiting_timeout();
        self.arm(&mut inner, delay, 0);
    }

    /// A few timeupdates right after `waiting` mean a borderline stall on
    /// some platforms, not a clean resume; each one re-arms the short
    /// timeout until the counter hits the cap.
    pub fn on_timeupdate(&self) {
        let mut inner = lock(&self.inner);
        if inner.detached {
            return;
        }
        inner.state.last_timeupdate = Some(Instant::now());

        if !inner.state.waiting || inner.state.timeupdate_count >= inner.settings.max_timeupdates {
            return;
        }
        inner.state.timeupdate_count += 1;

        let key = inner.state.timeupdate_count;
        let delay = inner.settings.stall_timeout();
        self.arm(&mut inner, delay, key);
    }

    /// Resuming from an explicit pause shifts the last-timeupdate mark by the
    /// paused duration, so the pause does not read as lag.
    pub fn on_play(&self) {
        let mut inner = lock(&self.inner);
        if inner.detached {
            return;
        }
        let state = &mut inner.state;
        if state.paused {
            if let (Some(paused_at), Some(last)) = (state.last_pause, state.last_timeupdate) {
                let paused_for = Instant::now().saturating_duration_since(paused_at.max(last));
                state.last_timeupdate = Some(last + paused_for);
            }
        }
        state.paused = false;
        state.last_pause = None;
    }

    /// Healthy playback: clears every flag, including a detected stall.
    pub fn on_playing(&self) {
        let mut inner = lock(&self.inner);
        if inner.detached {
            return;
        }
        inner.timer.cancel();
        let stall_count = inner.state.stall_count;
        inner.state = StallState {
            stall_count,
            ..StallState::default()
        };
    }

    pub fn on_pause(&self) {
        let mut inner = lock(&self.inner);
        if inner.detached {
            return;
        }
        Self::halt(&mut inner);
        inner.state.paused = true;
    }

    /// Terminal for arming until the next `playing`.
    pub fn on_ended(&self) {
        let mut inner = lock(&self.inner);
        if inner.detached {
            return;
        }
        Self::halt(&mut inner);
        inner.state.ended = true;
    }

    pub fn is_stall_detected(&self) -> bool {
        lock(&self.inner).state.stall_detected
    }

    /// Time since the last timeupdate, excluding an ongoing intentional pause.
    pub fn lag_time(&self) -> Option<Duration> {
        lock(&self.inner).state.lag_at(Instant::now())
    }

    pub fn snapshot(&self) -> StallState {
        lock(&self.inner).state.clone()
    }

    pub fn ad(&self) -> AdContext {
        lock(&self.inner).ad.clone()
    }

    /// Stop watching: cancel the timer, ignore later events and emit the
    /// ad-end record. Calling it twice is a no-op.
    pub fn detach(&self) {
        let (record, sink) = {
            let mut inner = lock(&self.inner);
            if inner.detached {
                return;
            }
            inner.detached = true;
            inner.timer.cancel();
            inner.on_stall = None;

            let record = AdPlaybackRecord {
                ad_id: inner.ad.ad_id.clone(),
                element_id: inner.ad.element_id.clone(),
                stall_detected: inner.state.stall_detected,
                stall_count: inner.state.stall_count,
                ended: inner.state.ended,
            };
            (record, Arc::clone(&inner.sink))
        };

        tracing::debug!(ad_id = %record.ad_id, stalls = record.stall_count, "stall detector detached");
        emit_record(&*sink, topics::AD_END, &record);
    }

    /// Ending is not an intentional pause, so only `on_pause` sets `paused`.
    fn halt(inner: &mut Inner) {
        inner.state.waiting = false;
        inner.timer.cancel();
        inner.state.last_pause = Some(Instant::now());
    }

    fn arm(&self, inner: &mut Inner, delay: Duration, key: u8) {
        if inner.state.ended {
            return;
        }
        inner.generation += 1;
        let generation = inner.generation;
        let weak = Arc::downgrade(&self.inner);
        inner.timer.arm(delay, move || fire(weak, key, generation));
        tracing::trace!(ad_id = %inner.ad.ad_id, key, ?delay, "stall timeout armed");
    }
}

/// Timer body. Valid only if no timeupdate arrived since it was armed.
fn fire(weak: Weak<Mutex<Inner>>, key: u8, generation: u64) {
    let Some(inner) = weak.upgrade() else {
        return;
    };

    let (record, sink, callback) = {
        let mut inner = lock(&inner);
        let state = &inner.state;
        if inner.detached
            || inner.generation != generation
            || state.ended
            || !state.waiting
            || state.stall_detected
            || state.timeupdate_count != key
        {
            tracing::trace!(key, current = state.timeupdate_count, "superseded stall timeout");
            return;
        }

        inner.state.stall_detected = true;
        inner.state.stall_count = inner.state.stall_count.saturating_add(1);

        let record = AdStallRecord {
            ad_id: inner.ad.ad_id.clone(),
            element_id: inner.ad.element_id.clone(),
            timeupdate_count: inner.state.timeupdate_count,
            lag_ms: inner
                .state
                .lag_at(Instant::now())
                .map(|lag| lag.as_millis() as u64),
            stall_count: inner.state.stall_count,
        };
        (record, Arc::clone(&inner.sink), inner.on_stall.take())
    };

    tracing::info!(
        ad_id = %record.ad_id,
        timeupdates = record.timeupdate_count,
        lag_ms = ?record.lag_ms,
        "ad playback stalled"
    );
    emit_record(&*sink, topics::AD_STALL, &record);
    if let Some(callback) = callback {
        callback(record);
    }
}

impl std::fmt::Debug for StallDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("StallDetector")
            .field("ad", &inner.ad)
            .field("state", &inner.state)
            .field("detached", &inner.detached)
            .finish_non_exhaustive()
    }
}
