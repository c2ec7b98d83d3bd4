//! Progress events for streaming callers
//!
//! Emission is fire-and-forget: events go out on an unbounded channel and
//! the pipeline never waits for a consumer. A dropped receiver just turns
//! the sink off.

use crate::run::RunId;
use crate::stage::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use vs_sandbox::{StepRecord, ViolationKind};
use vs_verify::Consensus;

/// One progress record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: RunId,
    /// Position in this run's event stream, from 0
    pub sequence: u64,
    pub stage: Stage,
    /// Human-facing status line
    pub status: String,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

/// Stage-specific event data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    None,
    Problem {
        latex: String,
    },
    Understanding {
        category: String,
        description: String,
    },
    Code {
        attempt: u32,
        /// Leading part of the generated program
        snippet: String,
    },
    Rejection {
        violation: ViolationKind,
        construct: String,
        line: usize,
    },
    Step(StepRecord),
    Verification {
        tally: String,
        consensus: Consensus,
    },
    Explanation {
        fallback: bool,
    },
    Visualizations {
        count: usize,
    },
    Failure {
        error: String,
    },
}

/// Settings for progress events and the incident feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Characters of generated code carried by `Code` events
    pub snippet_chars: usize,
    /// Emit one `Step` event per step record
    pub step_events: bool,
    /// Buffered incidents per subscriber
    pub incident_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            snippet_chars: 600,
            step_events: true,
            incident_capacity: 64,
        }
    }
}

/// Create an event channel for [`crate::PipelineOrchestrator::solve_with_events`]
#[must_use]
pub fn channel() -> (UnboundedSender<ProgressEvent>, UnboundedReceiver<ProgressEvent>) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Per-run emitter that numbers events
#[derive(Debug)]
pub(crate) struct EventSink {
    run_id: RunId,
    sender: Option<UnboundedSender<ProgressEvent>>,
    sequence: u64,
    snippet_chars: usize,
}

impl EventSink {
    pub(crate) fn new(
        run_id: RunId,
        sender: Option<UnboundedSender<ProgressEvent>>,
        config: &EventConfig,
    ) -> Self {
        Self {
            run_id,
            sender,
            sequence: 0,
            snippet_chars: config.snippet_chars,
        }
    }

    pub(crate) fn emit(&mut self, stage: Stage, status: impl Into<String>, payload: EventPayload) {
        let Some(sender) = &self.sender else {
            return;
        };
        let event = ProgressEvent {
            run_id: self.run_id,
            sequence: self.sequence,
            stage,
            status: status.into(),
            payload,
            timestamp: Utc::now(),
        };
        self.sequence += 1;
        if sender.send(event).is_err() {
            tracing::debug!(run_id = %self.run_id, "progress receiver dropped");
            self.sender = None;
        }
    }

    pub(crate) fn snippet(&self, code: &str) -> String {
        let mut snippet: String = code.chars().take(self.snippet_chars).collect();
        if snippet.len() < code.len() {
            snippet.push_str("...");
        }
        snippet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sequence_numbers_are_contiguous() {
        let (tx, mut rx) = channel();
        let mut sink = EventSink::new(RunId::new(), Some(tx), &EventConfig::default());
        sink.emit(Stage::Parsed, "received", EventPayload::None);
        sink.emit(Stage::Understood, "understood", EventPayload::None);
        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!((first.sequence, second.sequence), (0, 1));
        assert_eq!(second.stage, Stage::Understood);
    }

    #[test]
    fn dropped_receiver_does_not_block() {
        let (tx, rx) = channel();
        drop(rx);
        let mut sink = EventSink::new(RunId::new(), Some(tx), &EventConfig::default());
        sink.emit(Stage::Parsed, "received", EventPayload::None);
        sink.emit(Stage::Understood, "understood", EventPayload::None);
        assert!(sink.sender.is_none());
    }

    #[test]
    fn long_code_is_truncated() {
        let config = EventConfig {
            snippet_chars: 4,
            ..EventConfig::default()
        };
        let sink = EventSink::new(RunId::new(), None, &config);
        assert_eq!(sink.snippet("set_result(1)"), "set_...");
        assert_eq!(sink.snippet("x=1"), "x=1");
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let json = serde_json::to_value(EventPayload::Visualizations { count: 2 }).unwrap();
        assert_eq!(json["type"], "visualizations");
        assert_eq!(json["count"], 2);
    }
}
