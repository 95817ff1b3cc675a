//! Stage definitions and resolution rules.
//!
//! Pure domain logic - no I/O, no clocks.

use serde::{Deserialize, Serialize};

use crate::record::SessionRecord;

/// Length of the early-start window, counted in fullscreen ticks since the
/// most recent playback start (session start, resume, error-modal dismissal).
pub const EARLY_START_GAP_SECONDS: u64 = 30;

/// Discrete phase of a viewing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Session allocated, nothing played yet.
    #[default]
    Idle,
    /// Player reported it can start.
    Ready,
    Paused,
    /// First evaluation after a pause ends.
    PausedResume,
    /// Playing in the banner/preview window.
    UnderPreview,
    Ad,
    /// Early window with the programme guide open.
    WithEpg,
    EarlyStart,
    /// Settled viewing past the early window.
    InStream,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Idle => "IDLE",
            Stage::Ready => "READY",
            Stage::Paused => "PAUSED",
            Stage::PausedResume => "PAUSED_RESUME",
            Stage::UnderPreview => "UNDER_PREVIEW",
            Stage::Ad => "AD",
            Stage::WithEpg => "WITH_EPG",
            Stage::EarlyStart => "EARLY_START",
            Stage::InStream => "IN_STREAM",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

type Predicate = fn(&SessionRecord, Stage) -> bool;
type Transition = fn(&mut SessionRecord, Stage) -> Stage;

/// One entry of the resolution table: when `applies` holds for the record and
/// the stage read before this pass, `transition` produces the new stage.
pub struct StageRule {
    pub name: &'static str,
    applies: Predicate,
    transition: Transition,
}

/// Resolution table, evaluated top to bottom; the first match wins.
///
/// The last rule always applies, so resolution never falls through.
pub const STAGE_RULES: &[StageRule] = &[
    StageRule {
        name: "paused",
        applies: is_paused,
        transition: to_paused,
    },
    StageRule {
        name: "resumed",
        applies: was_paused,
        transition: to_paused_resume,
    },
    StageRule {
        name: "preview",
        applies: in_preview,
        transition: to_under_preview,
    },
    StageRule {
        name: "ad",
        applies: in_ad,
        transition: to_ad,
    },
    StageRule {
        name: "early_after_resume",
        applies: early_after_resume,
        transition: keep_previous,
    },
    StageRule {
        name: "early_with_epg",
        applies: early_with_epg,
        transition: to_with_epg,
    },
    StageRule {
        name: "early_start",
        applies: in_early_window,
        transition: to_early_start,
    },
    StageRule {
        name: "in_stream",
        applies: always,
        transition: to_in_stream,
    },
];

/// Run the resolution table against `record`, store and return the new stage
/// together with the name of the rule that produced it.
pub fn resolve_stage(record: &mut SessionRecord) -> (Stage, &'static str) {
    let previous = record.stage;
    for rule in STAGE_RULES {
        if (rule.applies)(record, previous) {
            let next = (rule.transition)(record, previous);
            record.stage = next;
            return (next, rule.name);
        }
    }
    (previous, "none")
}

fn in_early_window_secs(record: &SessionRecord) -> bool {
    record.fullscreen_since_start_secs < EARLY_START_GAP_SECONDS
}

fn is_paused(record: &SessionRecord, _previous: Stage) -> bool {
    record.paused
}

fn was_paused(_record: &SessionRecord, previous: Stage) -> bool {
    previous == Stage::Paused
}

fn in_preview(record: &SessionRecord, _previous: Stage) -> bool {
    record.preview
}

fn in_ad(record: &SessionRecord, _previous: Stage) -> bool {
    record.ad_active
}

// EPG is not re-checked here; a resumed session stays PAUSED_RESUME for the
// whole early window.
fn early_after_resume(record: &SessionRecord, previous: Stage) -> bool {
    in_early_window_secs(record) && previous == Stage::PausedResume
}

fn early_with_epg(record: &SessionRecord, _previous: Stage) -> bool {
    in_early_window_secs(record) && record.epg_visible
}

fn in_early_window(record: &SessionRecord, _previous: Stage) -> bool {
    in_early_window_secs(record)
}

fn always(_record: &SessionRecord, _previous: Stage) -> bool {
    true
}

fn to_paused(_record: &mut SessionRecord, _previous: Stage) -> Stage {
    Stage::Paused
}

fn to_paused_resume(record: &mut SessionRecord, _previous: Stage) -> Stage {
    record.fullscreen_since_start_secs = 0;
    Stage::PausedResume
}

fn to_under_preview(_record: &mut SessionRecord, _previous: Stage) -> Stage {
    Stage::UnderPreview
}

fn to_ad(_record: &mut SessionRecord, _previous: Stage) -> Stage {
    Stage::Ad
}

fn keep_previous(_record: &mut SessionRecord, previous: Stage) -> Stage {
    previous
}

fn to_with_epg(_record: &mut SessionRecord, _previous: Stage) -> Stage {
    Stage::WithEpg
}

fn to_early_start(_record: &mut SessionRecord, _previous: Stage) -> Stage {
    Stage::EarlyStart
}

fn to_in_stream(record: &mut SessionRecord, _previous: Stage) -> Stage {
    record.error_modal_resolved = true;
    Stage::InStream
}
