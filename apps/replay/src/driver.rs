//! Drives the three trackers from a parsed script.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use playsense_events::{AnalyticsSinkRef, SessionSummary};
use playsense_guard::{
    BackgroundPlaybackGuard, PlayerControl, PlayerError, PlayerKind, SignalError, SignalProvider,
    SignalStatus,
};
use playsense_session::{PauseCause, PlaybackError, SessionStageTracker};
use playsense_stall::{AdContext, StallCallback, StallDetector};

use crate::script::{AdEvent, GuardEvent, ReplayConfig, SessionEvent, Step, TargetedEvent};

/// Signal provider whose state the script sets.
pub struct ScriptedSignal {
    connected: AtomicBool,
}

impl ScriptedSignal {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl SignalProvider for ScriptedSignal {
    async fn signal_status(&self) -> Result<SignalStatus, SignalError> {
        Ok(SignalStatus::from_connected(
            self.connected.load(Ordering::SeqCst),
        ))
    }
}

/// Player that only logs the commands it receives.
pub struct LoggingPlayer {
    kind: PlayerKind,
    paused: AtomicBool,
    /// Set by `pause`, consumed by the driver to update the session.
    pause_notice: AtomicBool,
}

impl LoggingPlayer {
    pub fn new(kind: PlayerKind) -> Self {
        Self {
            kind,
            paused: AtomicBool::new(false),
            pause_notice: AtomicBool::new(false),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn take_pause_notice(&self) -> bool {
        self.pause_notice.swap(false, Ordering::SeqCst)
    }
}

impl PlayerControl for LoggingPlayer {
    fn kind(&self) -> PlayerKind {
        self.kind
    }

    fn pause(&self) -> Result<(), PlayerError> {
        tracing::info!(kind = ?self.kind, "player paused");
        self.paused.store(true, Ordering::SeqCst);
        self.pause_notice.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<(), PlayerError> {
        tracing::info!(kind = ?self.kind, "player resumed");
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// One replay run.
pub struct Replay {
    config: ReplayConfig,
    sink: AnalyticsSinkRef,
    session: SessionStageTracker,
    ad: Option<StallDetector>,
    guard: BackgroundPlaybackGuard,
    signal: Arc<ScriptedSignal>,
    player: Arc<LoggingPlayer>,
}

impl Replay {
    pub fn new(config: ReplayConfig, sink: AnalyticsSinkRef) -> Self {
        let signal = Arc::new(ScriptedSignal::new());
        let player = Arc::new(LoggingPlayer::new(config.player));
        let guard = BackgroundPlaybackGuard::new(
            player.clone(),
            signal.clone(),
            config.guard.clone(),
            Arc::clone(&sink),
        );
        Self {
            session: SessionStageTracker::new(Arc::clone(&sink)),
            ad: None,
            guard,
            signal,
            player,
            config,
            sink,
        }
    }

    pub fn session(&self) -> &SessionStageTracker {
        &self.session
    }

    pub fn ad(&self) -> Option<&StallDetector> {
        self.ad.as_ref()
    }

    pub fn player(&self) -> &LoggingPlayer {
        &self.player
    }

    pub async fn run(&mut self, steps: Vec<Step>) {
        tracing::info!(steps = steps.len(), "replay started");
        for step in steps {
            match step {
                Step::Wait(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                Step::Event(TargetedEvent::Session(event)) => self.apply_session(event),
                Step::Event(TargetedEvent::Ad(event)) => self.apply_ad(event),
                Step::Event(TargetedEvent::Guard(event)) => self.apply_guard(event).await,
            }
            self.sync_player_pause();
        }
    }

    /// Detach everything and close the session.
    pub fn finish(mut self) -> SessionSummary {
        if let Some(detector) = self.ad.take() {
            detector.detach();
        }
        self.guard.teardown();
        let summary = self.session.end_session();
        tracing::info!(session_id = %summary.session_id, stage = %summary.stage, "replay finished");
        summary
    }

    fn apply_session(&mut self, event: SessionEvent) {
        let session = &mut self.session;
        match event {
            SessionEvent::Start => {
                session.start();
            }
            SessionEvent::Ready => session.mark_ready(),
            SessionEvent::Position { position } => session.position(position),
            SessionEvent::AdStart => session.ad_start(),
            SessionEvent::AdComplete => session.ad_complete(),
            SessionEvent::Pause { cause } => session.set_paused(cause),
            SessionEvent::Fullscreen { mode } => session.set_fullscreen(mode),
            SessionEvent::Epg { visible } => session.set_epg_visible(visible),
            SessionEvent::ErrorModal { visible: true } => session.show_error_modal(),
            SessionEvent::ErrorModal { visible: false } => session.hide_error_modal(),
            SessionEvent::Error { message, code } => session.record_error(PlaybackError {
                code,
                message,
            }),
            SessionEvent::Stall { seconds } => session.record_stall(seconds),
            SessionEvent::Revisit => session.mark_revisit(),
            SessionEvent::ExpiredReload => session.mark_expired_reload(),
            SessionEvent::Buffering { buffering } => session.set_buffering(buffering),
            SessionEvent::End => {
                session.end_session();
            }
        }
    }

    fn apply_ad(&mut self, event: AdEvent) {
        if let AdEvent::Start { ad_id, element_id } = event {
            if let Some(previous) = self.ad.take() {
                previous.detach();
            }
            let on_stall: StallCallback = Arc::new(|record| {
                tracing::warn!(ad_id = %record.ad_id, timeupdates = record.timeupdate_count, "ad stalled");
            });
            self.ad = Some(StallDetector::new(
                AdContext::new(ad_id, element_id),
                self.config.stall,
                Arc::clone(&self.sink),
                on_stall,
            ));
            return;
        }

        let Some(detector) = &self.ad else {
            tracing::warn!(?event, "ad event before ad start, skipping");
            return;
        };
        match event {
            AdEvent::Waiting => detector.on_waiting(),
            AdEvent::Timeupdate => detector.on_timeupdate(),
            AdEvent::Play => detector.on_play(),
            AdEvent::Playing => detector.on_playing(),
            AdEvent::Pause => detector.on_pause(),
            AdEvent::Ended => detector.on_ended(),
            AdEvent::Detach => {
                detector.detach();
                self.ad = None;
            }
            AdEvent::Start { .. } => {}
        }
    }

    async fn apply_guard(&mut self, event: GuardEvent) {
        match event {
            GuardEvent::Position { position } => self.guard.on_position(position).await,
            GuardEvent::Signal { connected } => {
                self.signal.set_connected(connected);
                self.guard.on_signal_change(connected);
            }
            GuardEvent::SilentSignal { connected } => self.signal.set_connected(connected),
            GuardEvent::KeyPress => self.guard.on_key_press(),
            GuardEvent::Teardown => self.guard.teardown(),
        }
    }

    /// An auto-pause from the guard pauses the session too.
    fn sync_player_pause(&mut self) {
        if self.player.take_pause_notice() {
            self.session.set_paused(PauseCause::BackgroundPlayback);
        }
    }
}
