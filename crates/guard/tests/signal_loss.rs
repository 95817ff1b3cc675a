//! Integration tests for the background playback guard.
//!
//! Uses a scripted signal provider and a counting player on a paused tokio
//! clock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use playsense_events::{topics, BackgroundPlaybackRecord, GuardActionRecord, InMemoryAnalyticsSink};
use playsense_guard::{
    BackgroundPlaybackGuard, GuardSettings, PlayerControl, PlayerError, PlayerKind, SignalError,
    SignalProvider, SignalStatus,
};
use tokio::sync::Notify;
use tokio::time::sleep;

struct ScriptedSignal {
    connected: AtomicBool,
    failing: AtomicBool,
}

impl ScriptedSignal {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            failing: AtomicBool::new(false),
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SignalProvider for ScriptedSignal {
    async fn signal_status(&self) -> Result<SignalStatus, SignalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SignalError::Query("cec bus timeout".to_string()));
        }
        Ok(SignalStatus::from_connected(
            self.connected.load(Ordering::SeqCst),
        ))
    }
}

struct CountingPlayer {
    kind: PlayerKind,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
    reject_pause: AtomicBool,
}

impl CountingPlayer {
    fn new(kind: PlayerKind) -> Self {
        Self {
            kind,
            pauses: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
            reject_pause: AtomicBool::new(false),
        }
    }

    fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }
}

impl PlayerControl for CountingPlayer {
    fn kind(&self) -> PlayerKind {
        self.kind
    }

    fn pause(&self) -> Result<(), PlayerError> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        if self.reject_pause.load(Ordering::SeqCst) {
            return Err(PlayerError::Rejected("decoder busy".to_string()));
        }
        Ok(())
    }

    fn resume(&self) -> Result<(), PlayerError> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    guard: Arc<BackgroundPlaybackGuard>,
    signal: Arc<ScriptedSignal>,
    player: Arc<CountingPlayer>,
    sink: Arc<InMemoryAnalyticsSink>,
}

impl Harness {
    /// One tick per second at positions `from..=to`.
    async fn play(&self, from: u32, to: u32) {
        for p in from..=to {
            self.guard.on_position(p as f64).await;
            sleep(Duration::from_secs(1)).await;
        }
    }

    fn go_dark(&self) {
        self.signal.set_connected(false);
        self.guard.on_signal_change(false);
    }

    fn reconnect(&self) {
        self.signal.set_connected(true);
        self.guard.on_signal_change(true);
    }
}

fn create_guard(kind: PlayerKind, settings: GuardSettings) -> Harness {
    let signal = Arc::new(ScriptedSignal::new());
    let player = Arc::new(CountingPlayer::new(kind));
    let sink = Arc::new(InMemoryAnalyticsSink::new());
    let guard = Arc::new(BackgroundPlaybackGuard::new(
        player.clone(),
        signal.clone(),
        settings,
        sink.clone(),
    ));
    Harness {
        guard,
        signal,
        player,
        sink,
    }
}

fn delayed(pause_delay_ms: u64) -> GuardSettings {
    GuardSettings {
        source: "live".to_string(),
        pause_delay_ms,
        ..GuardSettings::default()
    }
}

fn accounting_only() -> GuardSettings {
    GuardSettings {
        source: "live".to_string(),
        pause_on_signal_loss: false,
        ..GuardSettings::default()
    }
}

// =============================================================================
// Auto-pause scheduling
// =============================================================================

mod auto_pause {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_short_disconnect_never_pauses() {
        let h = create_guard(PlayerKind::Main, delayed(5000));
        h.go_dark();
        h.play(1, 4).await;
        h.reconnect();

        h.play(5, 15).await;
        assert_eq!(h.player.pauses(), 0);
        assert!(!h.guard.stats().pause_scheduled);
        assert!(h.sink.records_for(topics::GUARD_AUTO_PAUSED).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_disconnect_pauses_exactly_once() {
        let h = create_guard(PlayerKind::Main, delayed(3000));
        h.go_dark();
        h.play(1, 10).await;

        assert_eq!(h.player.pauses(), 1);
        assert!(h.guard.stats().paused_by_guard);

        let records = h.sink.records_for(topics::GUARD_AUTO_PAUSED);
        assert_eq!(records.len(), 1);
        let record: GuardActionRecord = records[0].decode().unwrap();
        assert_eq!(record.source, "live");
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_disconnect_notifications_do_not_stack() {
        let h = create_guard(PlayerKind::Main, delayed(3000));
        h.go_dark();
        sleep(Duration::from_secs(1)).await;
        h.guard.on_signal_change(false);
        sleep(Duration::from_secs(1)).await;
        h.guard.on_signal_change(false);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(h.player.pauses(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_ticks_cancel_pending_pause() {
        let h = create_guard(PlayerKind::Main, delayed(5000));
        h.signal.set_connected(false);
        h.guard.on_position(1.0).await;
        assert!(h.guard.stats().pause_scheduled);

        // Signal returns without a notification
        h.signal.set_connected(true);
        h.play(2, 8).await;

        assert_eq!(h.player.pauses(), 0);
        let stats = h.guard.stats();
        assert!(!stats.signal_lost);
        assert!(!stats.pause_scheduled);
        assert!(h.sink.records_for(topics::GUARD_AUTO_PAUSED).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_pauses_on_first_dark_tick() {
        let h = create_guard(PlayerKind::Main, delayed(0));
        h.signal.set_connected(false);

        h.guard.on_position(10.0).await;
        assert_eq!(h.player.pauses(), 1);

        h.play(11, 14).await;
        assert_eq!(h.player.pauses(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preview_player_is_exempt() {
        let h = create_guard(PlayerKind::Preview, delayed(0));
        h.go_dark();
        h.play(1, 8).await;

        assert_eq!(h.player.pauses(), 0);
        assert_eq!(h.guard.stats().seconds_disconnected, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_can_disable_pausing() {
        let h = create_guard(PlayerKind::Main, accounting_only());
        h.go_dark();
        h.play(1, 8).await;
        assert_eq!(h.player.pauses(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_pause_is_retried_on_next_tick() {
        let h = create_guard(PlayerKind::Main, delayed(0));
        h.player.reject_pause.store(true, Ordering::SeqCst);
        h.signal.set_connected(false);

        h.guard.on_position(1.0).await;
        assert_eq!(h.player.pauses(), 1);
        assert!(!h.guard.stats().paused_by_guard);

        h.player.reject_pause.store(false, Ordering::SeqCst);
        h.guard.on_position(2.0).await;
        assert_eq!(h.player.pauses(), 2);
        assert!(h.guard.stats().paused_by_guard);
    }
}

// =============================================================================
// Reconnect
// =============================================================================

mod reconnect {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_resumes_auto_paused_player() {
        let h = create_guard(PlayerKind::Main, delayed(0));
        h.go_dark();
        assert_eq!(h.player.pauses(), 1);

        h.reconnect();
        assert_eq!(h.player.resumes(), 1);
        assert_eq!(h.sink.records_for(topics::GUARD_RESUMED).len(), 1);

        let stats = h.guard.stats();
        assert!(!stats.signal_lost);
        assert!(!stats.paused_by_guard);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_without_auto_pause_does_not_resume() {
        let h = create_guard(PlayerKind::Main, delayed(5000));
        h.go_dark();
        h.reconnect();
        assert_eq!(h.player.resumes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_analytics_still_pauses() {
        let settings = GuardSettings {
            analytics_enabled: false,
            ..delayed(0)
        };
        let h = create_guard(PlayerKind::Main, settings);
        h.go_dark();
        h.play(1, 10).await;
        h.reconnect();
        h.guard.teardown();

        assert_eq!(h.player.pauses(), 1);
        assert_eq!(h.player.resumes(), 1);
        assert!(h.sink.is_empty());
    }
}

// =============================================================================
// Accounting
// =============================================================================

mod accounting {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_threshold_record_emitted_once() {
        let h = create_guard(PlayerKind::Main, accounting_only());
        h.signal.set_connected(false);
        h.play(0, 10).await;

        assert_eq!(h.guard.stats().seconds_disconnected, 10);
        let records = h.sink.records_for(topics::GUARD_THRESHOLD);
        assert_eq!(records.len(), 1);
        let record: BackgroundPlaybackRecord = records[0].decode().unwrap();
        assert_eq!(record.seconds_disconnected, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_position_adds_nothing() {
        let h = create_guard(PlayerKind::Main, accounting_only());
        h.signal.set_connected(false);
        for _ in 0..5 {
            h.guard.on_position(42.0).await;
            h.guard.on_position(42.5).await;
        }
        assert_eq!(h.guard.stats().seconds_disconnected, 0);
        assert!(h.guard.stats().signal_lost);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_ticks_are_noop() {
        let h = create_guard(PlayerKind::Main, delayed(0));
        h.play(1, 20).await;

        let stats = h.guard.stats();
        assert_eq!(stats.seconds_disconnected, 0);
        assert!(!stats.signal_lost);
        assert_eq!(h.player.pauses(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_failure_fails_open() {
        let h = create_guard(PlayerKind::Main, delayed(0));
        h.signal.set_connected(false);
        h.signal.set_failing(true);
        h.play(1, 10).await;

        assert_eq!(h.guard.stats().seconds_disconnected, 0);
        assert_eq!(h.player.pauses(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_positions_ignored() {
        let h = create_guard(PlayerKind::Main, accounting_only());
        h.signal.set_connected(false);
        h.guard.on_position(1.0).await;
        h.guard.on_position(f64::NAN).await;
        h.guard.on_position(-4.0).await;
        h.guard.on_position(2.0).await;
        assert_eq!(h.guard.stats().seconds_disconnected, 1);
    }
}

// =============================================================================
// Interaction gating
// =============================================================================

mod interaction {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_presses_before_threshold_ignored() {
        let h = create_guard(PlayerKind::Main, accounting_only());
        h.signal.set_connected(false);
        h.play(0, 3).await;

        for _ in 0..3 {
            h.guard.on_key_press();
        }
        assert_eq!(h.guard.stats().interaction_attempts, 0);

        h.play(4, 6).await;
        assert_eq!(h.guard.stats().seconds_disconnected, 6);
        for _ in 0..3 {
            h.guard.on_key_press();
        }
        assert_eq!(h.guard.stats().interaction_attempts, 3);

        h.play(7, 8).await;
        assert_eq!(h.guard.stats().seconds_with_interaction, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_few_presses_stay_unattended() {
        let h = create_guard(PlayerKind::Main, accounting_only());
        h.signal.set_connected(false);
        h.play(0, 7).await;

        h.guard.on_key_press();
        h.guard.on_key_press();
        h.play(8, 12).await;

        let stats = h.guard.stats();
        assert_eq!(stats.interaction_attempts, 2);
        assert_eq!(stats.seconds_with_interaction, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_outage_needs_its_own_threshold() {
        let h = create_guard(PlayerKind::Main, accounting_only());
        h.go_dark();
        h.play(0, 7).await;
        h.reconnect();

        h.go_dark();
        for _ in 0..3 {
            h.guard.on_key_press();
        }
        assert_eq!(h.guard.stats().interaction_attempts, 0);

        h.play(8, 10).await;
        let stats = h.guard.stats();
        assert_eq!(stats.seconds_disconnected, 10);
        assert_eq!(stats.stretch_seconds_disconnected, 3);
        assert_eq!(stats.seconds_with_interaction, 0);

        for _ in 0..3 {
            h.guard.on_key_press();
        }
        assert_eq!(h.guard.stats().interaction_attempts, 0);

        h.play(11, 13).await;
        for _ in 0..3 {
            h.guard.on_key_press();
        }
        assert_eq!(h.guard.stats().interaction_attempts, 3);
        assert_eq!(h.guard.stats().seconds_with_interaction, 0);

        h.play(14, 14).await;
        assert_eq!(h.guard.stats().seconds_with_interaction, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_starts_new_stretch() {
        let h = create_guard(PlayerKind::Main, accounting_only());
        h.go_dark();
        h.play(0, 7).await;
        for _ in 0..4 {
            h.guard.on_key_press();
        }
        h.reconnect();

        let stats = h.guard.stats();
        assert_eq!(stats.interaction_attempts, 0);
        assert_eq!(stats.stretch_seconds_disconnected, 0);
        assert_eq!(stats.total_interaction_attempts, 4);

        // Connected presses never count
        h.guard.on_key_press();
        assert_eq!(h.guard.stats().total_interaction_attempts, 4);
    }
}

// =============================================================================
// Teardown and races
// =============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_teardown_emits_summary_over_threshold() {
        let h = create_guard(PlayerKind::Main, accounting_only());
        h.signal.set_connected(false);
        h.play(0, 9).await;
        h.guard.teardown();
        h.guard.teardown();

        let records = h.sink.records_for(topics::GUARD_SUMMARY);
        assert_eq!(records.len(), 1);
        let record: BackgroundPlaybackRecord = records[0].decode().unwrap();
        assert_eq!(record.seconds_disconnected, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_under_threshold_is_silent() {
        let h = create_guard(PlayerKind::Main, accounting_only());
        h.signal.set_connected(false);
        h.play(0, 3).await;
        h.guard.teardown();
        assert!(h.sink.records_for(topics::GUARD_SUMMARY).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_pending_pause() {
        let h = create_guard(PlayerKind::Main, delayed(5000));
        h.go_dark();
        h.guard.teardown();

        sleep(Duration::from_secs(10)).await;
        h.guard.on_signal_change(false);
        h.guard.on_position(3.0).await;
        h.guard.on_position(4.0).await;

        assert_eq!(h.player.pauses(), 0);
        assert_eq!(h.guard.stats().seconds_disconnected, 0);
    }

    struct GatedSignal {
        gate: Notify,
    }

    #[async_trait]
    impl SignalProvider for GatedSignal {
        async fn signal_status(&self) -> Result<SignalStatus, SignalError> {
            self.gate.notified().await;
            Ok(SignalStatus::Disconnected)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_query_discarded_after_reconnect() {
        let signal = Arc::new(GatedSignal {
            gate: Notify::new(),
        });
        let player = Arc::new(CountingPlayer::new(PlayerKind::Main));
        let guard = Arc::new(BackgroundPlaybackGuard::new(
            player.clone(),
            signal.clone(),
            delayed(60_000),
            Arc::new(InMemoryAnalyticsSink::new()),
        ));

        // Prime the position cache
        signal.gate.notify_one();
        guard.on_position(4.0).await;
        guard.on_signal_change(true);
        assert!(!guard.stats().pause_scheduled);

        let pending = {
            let guard = Arc::clone(&guard);
            tokio::spawn(async move { guard.on_position(5.0).await })
        };
        tokio::task::yield_now().await;

        // Reconnect lands while the query is suspended
        guard.on_signal_change(true);
        signal.gate.notify_one();
        pending.await.unwrap();

        let stats = guard.stats();
        assert_eq!(stats.seconds_disconnected, 0);
        assert!(!stats.pause_scheduled);
        assert!(!stats.signal_lost);
        assert_eq!(player.pauses(), 0);
    }
}
