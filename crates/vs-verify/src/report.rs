//! Verification report
//!
//! One [`BackendVerdict`] per configured backend, always in canonical
//! backend order. A backend that failed still gets a verdict; it simply
//! does not match.

use crate::backend::BackendCharacter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use vs_sandbox::StructuredValue;

/// Outcome of one backend's recomputation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendVerdict {
    /// Backend identifier
    pub backend: String,
    /// Human-readable engine label
    pub label: String,
    pub character: BackendCharacter,
    /// Recomputed value, absent when the backend failed
    pub value: Option<StructuredValue>,
    /// Text of the value, or of the error
    pub rendered: String,
    pub matches: bool,
    /// Why the backend produced no value
    pub error: Option<String>,
    #[serde(with = "vs_sandbox::limits::secs_f64")]
    pub elapsed: Duration,
}

/// Agreement level across all verdicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consensus {
    /// Every backend matched
    Unanimous,
    /// More than half matched
    Majority,
    /// Some but not more than half matched
    Split,
    /// No backend matched
    NoAgreement,
}

impl fmt::Display for Consensus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unanimous => "unanimous",
            Self::Majority => "majority",
            Self::Split => "split",
            Self::NoAgreement => "no_agreement",
        })
    }
}

/// Verdicts of all backends for one primary result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub verdicts: Vec<BackendVerdict>,
}

impl VerificationReport {
    /// Number of matching verdicts
    #[must_use]
    pub fn matches(&self) -> usize {
        self.verdicts.iter().filter(|v| v.matches).count()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.verdicts.len()
    }

    /// Informational agreement level; no backend outranks another
    #[must_use]
    pub fn consensus(&self) -> Consensus {
        let (matched, total) = (self.matches(), self.total());
        if total == 0 || matched == 0 {
            Consensus::NoAgreement
        } else if matched == total {
            Consensus::Unanimous
        } else if matched * 2 > total {
            Consensus::Majority
        } else {
            Consensus::Split
        }
    }

    /// `"matched/total"`
    #[must_use]
    pub fn tally(&self) -> String {
        format!("{}/{}", self.matches(), self.total())
    }

    /// Verdicts that did not match, in canonical order
    pub fn mismatches(&self) -> impl Iterator<Item = &BackendVerdict> {
        self.verdicts.iter().filter(|v| !v.matches)
    }

    #[must_use]
    pub fn verdict(&self, backend: &str) -> Option<&BackendVerdict> {
        self.verdicts.iter().find(|v| v.backend == backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn verdict(name: &str, matches: bool) -> BackendVerdict {
        BackendVerdict {
            backend: name.into(),
            label: name.into(),
            character: BackendCharacter::NumericFloat,
            value: None,
            rendered: String::new(),
            matches,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    fn report(flags: &[bool]) -> VerificationReport {
        VerificationReport {
            verdicts: flags
                .iter()
                .enumerate()
                .map(|(i, m)| verdict(&format!("b{i}"), *m))
                .collect(),
        }
    }

    #[test]
    fn consensus_levels() {
        assert_eq!(report(&[true, true, true]).consensus(), Consensus::Unanimous);
        assert_eq!(report(&[true, true, false]).consensus(), Consensus::Majority);
        assert_eq!(report(&[true, false, false]).consensus(), Consensus::Split);
        assert_eq!(report(&[true, false]).consensus(), Consensus::Split);
        assert_eq!(report(&[false, false]).consensus(), Consensus::NoAgreement);
        assert_eq!(report(&[]).consensus(), Consensus::NoAgreement);
    }

    #[test]
    fn tally_and_lookup() {
        let r = report(&[true, false, true]);
        assert_eq!(r.tally(), "2/3");
        assert_eq!(r.mismatches().map(|v| v.backend.as_str()).collect::<Vec<_>>(), vec!["b1"]);
        assert!(r.verdict("b2").is_some_and(|v| v.matches));
    }

    #[test]
    fn serializes_for_transport() {
        let json = serde_json::to_value(report(&[true])).unwrap();
        assert_eq!(json["verdicts"][0]["backend"], "b0");
        assert_eq!(json["verdicts"][0]["character"], "numeric_float");
    }
}
