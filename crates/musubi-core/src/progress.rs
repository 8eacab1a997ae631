//! Human-readable progress notices and the sink they are forwarded to.

use crate::context::RunId;
use crate::step::StepName;
use serde::Serialize;
use std::fmt;

/// Lifecycle phase a notice refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The step body was launched.
    Started,
    /// The step body returned successfully.
    Completed,
    /// The step body failed, timed out or panicked.
    Failed,
    /// A free-form message from inside the step body.
    Progress,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Started => write!(f, "started"),
            Phase::Completed => write!(f, "completed"),
            Phase::Failed => write!(f, "failed"),
            Phase::Progress => write!(f, "progress"),
        }
    }
}

/// A progress notice keyed by step name and lifecycle phase.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressNotice {
    /// The run the notice belongs to.
    pub run_id: RunId,
    /// The step that produced the notice.
    pub step: StepName,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Human-readable message; may be empty.
    pub message: String,
}

impl fmt::Display for ProgressNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{} | {}", self.step, self.phase)
        } else {
            write!(f, "{} | {} | {}", self.step, self.phase, self.message)
        }
    }
}

/// Receiver for progress notices.
///
/// The engine calls `notify` for each notice and never waits on the result;
/// implementations decide what to do with them (render, log, ignore).
pub trait ProgressSink: Send + Sync {
    /// Called for every notice of a run.
    fn notify(&self, notice: ProgressNotice);
}

/// A sink that discards all notices.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn notify(&self, _notice: ProgressNotice) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Started.to_string(), "started");
        assert_eq!(Phase::Failed.to_string(), "failed");
    }

    #[test]
    fn test_notice_display() {
        let mut notice = ProgressNotice {
            run_id: RunId::new(),
            step: StepName::new("extract_rules"),
            phase: Phase::Completed,
            message: String::new(),
        };
        assert_eq!(notice.to_string(), "extract_rules | completed");

        notice.message = "rules=4".to_string();
        assert_eq!(notice.to_string(), "extract_rules | completed | rules=4");
    }
}
