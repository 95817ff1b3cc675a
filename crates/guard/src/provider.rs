//! Boundary traits for the hardware signal and the player.
//!
//! These abstract the platform so the guard logic stays testable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Display signal state as reported by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Connected,
    Disconnected,
}

impl SignalStatus {
    pub fn from_connected(connected: bool) -> Self {
        if connected {
            SignalStatus::Connected
        } else {
            SignalStatus::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SignalStatus::Connected)
    }
}

/// Errors from a signal status query.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("signal query failed: {0}")]
    Query(String),

    #[error("signal source unavailable")]
    Unavailable,
}

/// Asynchronous hardware-signal status query.
#[async_trait]
pub trait SignalProvider: Send + Sync {
    async fn signal_status(&self) -> Result<SignalStatus, SignalError>;
}

/// Provider for platforms without signal detection.
pub struct AlwaysConnected;

#[async_trait]
impl SignalProvider for AlwaysConnected {
    async fn signal_status(&self) -> Result<SignalStatus, SignalError> {
        Ok(SignalStatus::Connected)
    }
}

/// Kind of player the guard is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerKind {
    /// Fullscreen channel player.
    #[default]
    Main,
    /// Banner/preview player; resumes itself when the app returns to the
    /// foreground.
    Preview,
}

impl PlayerKind {
    /// Signal-loss notifications do not pause this kind of player.
    pub fn exempt_from_auto_pause(&self) -> bool {
        matches!(self, PlayerKind::Preview)
    }

    /// The guard resumes this kind of player after reconnect.
    pub fn resumes_on_reconnect(&self) -> bool {
        matches!(self, PlayerKind::Main)
    }
}

/// Errors from a player command.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("player rejected command: {0}")]
    Rejected(String),

    #[error("player is no longer attached")]
    Detached,
}

/// Commands the guard may issue to its player.
///
/// Implementations must not call back into the guard synchronously.
pub trait PlayerControl: Send + Sync {
    fn kind(&self) -> PlayerKind;

    fn pause(&self) -> Result<(), PlayerError>;

    fn resume(&self) -> Result<(), PlayerError>;
}
