//! Solve run stage machine
//!
//! Runs only move forward. Any live stage may fail, a rejected candidate
//! re-enters `CodeGenerated` once for regeneration, and the two terminal
//! stages have no exits.

use crate::error::TransitionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Orchestration progress of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parsed,
    Understood,
    CodeGenerated,
    Validated,
    Executed,
    Verified,
    Explained,
    Visualized,
    Assembled,
    Failed,
}

impl Stage {
    /// Every stage in pipeline order
    pub const ALL: [Stage; 10] = [
        Stage::Parsed,
        Stage::Understood,
        Stage::CodeGenerated,
        Stage::Validated,
        Stage::Executed,
        Stage::Verified,
        Stage::Explained,
        Stage::Visualized,
        Stage::Assembled,
        Stage::Failed,
    ];

    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Assembled | Self::Failed)
    }

    /// Stable snake-case label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Understood => "understood",
            Self::CodeGenerated => "code_generated",
            Self::Validated => "validated",
            Self::Executed => "executed",
            Self::Verified => "verified",
            Self::Explained => "explained",
            Self::Visualized => "visualized",
            Self::Assembled => "assembled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a stage transition
///
/// # Errors
/// Returns [`TransitionError`] when `to` is not reachable from `from`.
pub fn validate_transition(from: Stage, to: Stage) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Stages directly reachable from `from`
#[must_use]
pub fn allowed_transitions(from: Stage) -> Vec<Stage> {
    use Stage::{
        Assembled, CodeGenerated, Executed, Explained, Failed, Parsed, Understood, Validated,
        Verified, Visualized,
    };
    match from {
        Parsed => vec![Understood, Failed],
        Understood => vec![CodeGenerated, Failed],
        CodeGenerated => vec![CodeGenerated, Validated, Failed],
        Validated => vec![Executed, Failed],
        Executed => vec![Verified, Failed],
        Verified => vec![Explained, Failed],
        Explained => vec![Visualized, Failed],
        Visualized => vec![Assembled, Failed],
        Assembled | Failed => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_a_chain() {
        for pair in Stage::ALL[..9].windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{pair:?}");
        }
    }

    #[test]
    fn regeneration_is_the_only_self_loop() {
        for stage in Stage::ALL {
            let looped = validate_transition(stage, stage).is_ok();
            assert_eq!(looped, stage == Stage::CodeGenerated, "{stage}");
        }
    }

    #[test]
    fn terminal_stages_have_no_exits() {
        assert!(allowed_transitions(Stage::Assembled).is_empty());
        assert!(allowed_transitions(Stage::Failed).is_empty());
        assert!(validate_transition(Stage::Failed, Stage::Parsed).is_err());
    }

    #[test]
    fn every_live_stage_can_fail() {
        for stage in Stage::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(validate_transition(stage, Stage::Failed).is_ok());
        }
    }

    #[test]
    fn skipping_is_rejected() {
        let err = validate_transition(Stage::CodeGenerated, Stage::Executed).unwrap_err();
        assert_eq!(err.to_string(), "illegal stage transition code_generated -> executed");
    }
}
