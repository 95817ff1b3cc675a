//! JSON-lines replay scripts.
//!
//! One step per line. A step is either a wait or an event aimed at one
//! tracker:
//!
//! ```text
//! {"wait_ms": 3000}
//! {"target": "session", "event": "position", "position": 12.0}
//! {"target": "ad", "event": "start", "ad_id": "a1", "element_id": "video"}
//! {"target": "guard", "event": "signal", "connected": false}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::path::{Path, PathBuf};

use playsense_guard::{GuardSettings, PlayerKind};
use playsense_session::{FullscreenMode, PauseCause};
use playsense_stall::StallSettings;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Config(#[source] serde_json::Error),
}

/// Settings for one replay run, read from `--config`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub stall: StallSettings,
    pub guard: GuardSettings,
    pub player: PlayerKind,
}

impl ReplayConfig {
    pub fn from_json(text: &str) -> Result<Self, ReplayError> {
        serde_json::from_str(text).map_err(ReplayError::Config)
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        Self::from_json(&read(path)?)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Start,
    Ready,
    Position { position: f64 },
    AdStart,
    AdComplete,
    Pause { cause: PauseCause },
    Fullscreen { mode: FullscreenMode },
    Epg { visible: bool },
    ErrorModal { visible: bool },
    Error {
        message: String,
        #[serde(default)]
        code: Option<String>,
    },
    Stall { seconds: f64 },
    Revisit,
    ExpiredReload,
    Buffering { buffering: bool },
    End,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdEvent {
    Start { ad_id: String, element_id: String },
    Waiting,
    Timeupdate,
    Play,
    Playing,
    Pause,
    Ended,
    Detach,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GuardEvent {
    Position { position: f64 },
    /// Change the hardware state and notify the guard.
    Signal { connected: bool },
    /// Change the hardware state without a notification; only position
    /// ticks will notice.
    SilentSignal { connected: bool },
    KeyPress,
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum TargetedEvent {
    Session(SessionEvent),
    Ad(AdEvent),
    Guard(GuardEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Wait(u64),
    Event(TargetedEvent),
}

#[derive(Deserialize)]
struct Wait {
    wait_ms: u64,
}

fn parse_step(text: &str) -> Result<Step, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.get("wait_ms").is_some() {
        let wait: Wait = serde_json::from_value(value)?;
        return Ok(Step::Wait(wait.wait_ms));
    }
    serde_json::from_value(value).map(Step::Event)
}

/// Parse a whole script. Line numbers in errors are 1-based.
pub fn parse_script(text: &str) -> Result<Vec<Step>, ReplayError> {
    let mut steps = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step = parse_step(line).map_err(|source| ReplayError::Parse {
            line: idx + 1,
            source,
        })?;
        steps.push(step);
    }
    Ok(steps)
}

pub fn load_script(path: &Path) -> Result<Vec<Step>, ReplayError> {
    parse_script(&read(path)?)
}

fn read(path: &Path) -> Result<String, ReplayError> {
    std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })
}
