// ABOUTME: Render sink trait receiving progress snapshots and step events.
// ABOUTME: Implementations live in the output module; tests use recording sinks.

use super::status::StatusRow;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Severity of a step event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventLevel::Debug => "debug",
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        })
    }
}

/// Receives every progress snapshot and operator-facing step line.
pub trait ProgressSink: Send + Sync {
    /// Draw one snapshot. Rows arrive in merge order.
    fn render(&self, rows: &[StatusRow], elapsed: Duration);

    /// Report a step of an operation, such as "pullimage" or "pushimage".
    fn event(&self, level: EventLevel, step: &str, message: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn render(&self, _rows: &[StatusRow], _elapsed: Duration) {}

    fn event(&self, _level: EventLevel, _step: &str, _message: &str) {}
}
