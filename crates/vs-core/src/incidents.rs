//! Incident feed
//!
//! Execution failures, rejected candidates and verification mismatches are
//! published for out-of-band consumers that mine them later. Publishing
//! never waits; with no subscriber the incident is dropped.

use crate::run::RunId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use vs_sandbox::{FailureKind, Rejection};

/// Something worth learning from after the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "incident", rename_all = "snake_case")]
pub enum Incident {
    /// Primary execution of an accepted candidate failed
    ExecutionFailed {
        run_id: RunId,
        /// Hex fingerprint of the candidate
        source: String,
        kind: FailureKind,
        message: String,
    },
    /// A generated candidate was rejected
    ValidationRejected {
        run_id: RunId,
        source: String,
        attempt: u32,
        rejection: Rejection,
    },
    /// At least one backend disagreed with the primary result
    VerificationMismatch {
        run_id: RunId,
        source: String,
        tally: String,
        backends: Vec<String>,
    },
}

impl Incident {
    #[must_use]
    pub fn run_id(&self) -> RunId {
        match self {
            Self::ExecutionFailed { run_id, .. }
            | Self::ValidationRejected { run_id, .. }
            | Self::VerificationMismatch { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast side of the incident feed
#[derive(Debug, Clone)]
pub(crate) struct IncidentFeed {
    sender: broadcast::Sender<Incident>,
}

impl IncidentFeed {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Incident> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, incident: Incident) {
        if self.sender.send(incident).is_err() {
            tracing::trace!("no incident subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn failed(run_id: RunId) -> Incident {
        Incident::ExecutionFailed {
            run_id,
            source: "abc".into(),
            kind: FailureKind::Runtime,
            message: "ZeroDivisionError: division by zero".into(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_incidents() {
        let feed = IncidentFeed::new(8);
        let mut rx = feed.subscribe();
        let run_id = RunId::new();
        feed.publish(failed(run_id));
        let incident = rx.recv().await.unwrap();
        assert_eq!(incident.run_id(), run_id);
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let feed = IncidentFeed::new(1);
        feed.publish(failed(RunId::new()));
        feed.publish(failed(RunId::new()));
    }
}
