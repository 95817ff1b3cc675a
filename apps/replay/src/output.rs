//! Record output for the replay CLI.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use playsense_events::{AnalyticsSink, SinkError};
use serde_json::json;

/// Writes every record as one JSON line: `{"topic": ..., "payload": ...}`.
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> AnalyticsSink for JsonLinesSink<W> {
    fn emit(&self, topic: &str, payload: serde_json::Value) -> Result<(), SinkError> {
        let line = json!({ "topic": topic, "payload": payload });
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| SinkError::Transport(e.to_string()))
    }
}
