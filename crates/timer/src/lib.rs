//! Single-slot cancellable timer.
//!
//! A `SingleSlotTimer` owns at most one pending task. Arming always cancels
//! whatever was pending first, so callers cannot stack timers of one kind.
//! Each arm gets a fresh `CancellationToken`, which makes cancel + re-arm
//! safe to repeat any number of times.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Slot {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Timer slot holding at most one outstanding task.
pub struct SingleSlotTimer {
    label: &'static str,
    slot: Option<Slot>,
}

impl SingleSlotTimer {
    /// Create an empty slot. `label` only shows up in logs.
    pub fn new(label: &'static str) -> Self {
        Self { label, slot: None }
    }

    /// Cancel any pending task, then schedule `on_fire` after `delay`.
    ///
    /// Returns `false` if no tokio runtime is available; nothing is
    /// scheduled in that case.
    pub fn arm<F>(&mut self, delay: Duration, on_fire: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(timer = self.label, "no tokio runtime, timer not armed");
            return false;
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let label = self.label;

        let handle = runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    tracing::trace!(timer = label, "timer fired");
                    on_fire();
                }
            }
        });

        tracing::trace!(timer = self.label, ?delay, "timer armed");
        self.slot = Some(Slot { cancel, handle });
        true
    }

    /// Cancel the pending task.
    ///
    /// Returns true if a task was still pending.
    pub fn cancel(&mut self) -> bool {
        let Some(slot) = self.slot.take() else {
            return false;
        };
        let pending = !slot.handle.is_finished();
        slot.cancel.cancel();
        slot.handle.abort();
        if pending {
            tracing::trace!(timer = self.label, "timer cancelled");
        }
        pending
    }

    /// Check whether a task is armed and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.slot
            .as_ref()
            .map(|slot| !slot.handle.is_finished() && !slot.cancel.is_cancelled())
            .unwrap_or(false)
    }
}

impl Drop for SingleSlotTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for SingleSlotTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleSlotTimer")
            .field("label", &self.label)
            .field("pending", &self.is_pending())
            .finish()
    }
}
