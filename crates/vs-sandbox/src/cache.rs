//! Verdict cache keyed by source fingerprint
//!
//! Validation is a pure function of policy and text, so verdicts for
//! regenerated candidates that repeat an earlier text are reused.

use crate::policy::CapabilityPolicy;
use crate::validator::{CandidateSource, Fingerprint, StaticValidator, ValidationVerdict};
use moka::sync::Cache;
use std::sync::Arc;
use tracing::trace;

const DEFAULT_CAPACITY: u64 = 1_024;

/// [`StaticValidator`] with a bounded verdict cache
#[derive(Clone)]
pub struct CachedValidator {
    inner: StaticValidator,
    verdicts: Cache<Fingerprint, ValidationVerdict>,
}

impl CachedValidator {
    /// Cache up to the default number of verdicts
    #[must_use]
    pub fn new(policy: Arc<CapabilityPolicy>) -> Self {
        Self::with_capacity(policy, DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(policy: Arc<CapabilityPolicy>, capacity: u64) -> Self {
        Self {
            inner: StaticValidator::new(policy),
            verdicts: Cache::new(capacity),
        }
    }

    /// Validate, reusing a cached verdict for identical text
    #[must_use]
    pub fn validate(&self, candidate: &CandidateSource) -> ValidationVerdict {
        let key = candidate.fingerprint();
        if let Some(hit) = self.verdicts.get(&key) {
            trace!(fingerprint = %key.short(), "validation cache hit");
            return hit;
        }
        let verdict = self.inner.validate(candidate);
        self.verdicts.insert(key, verdict.clone());
        verdict
    }

    #[inline]
    #[must_use]
    pub fn validator(&self) -> &StaticValidator {
        &self.inner
    }

    /// Cached verdict count; approximate while moka runs maintenance
    #[must_use]
    pub fn cached(&self) -> u64 {
        self.verdicts.run_pending_tasks();
        self.verdicts.entry_count()
    }
}

impl std::fmt::Debug for CachedValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedValidator")
            .field("entries", &self.verdicts.entry_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn repeated_text_hits_cache() {
        let cache = CachedValidator::new(CapabilityPolicy::shared_mathematics());
        let source = CandidateSource::new("import os\n");
        let first = cache.validate(&source);
        let second = cache.validate(&source);
        assert_eq!(first, second);
        assert_eq!(cache.cached(), 1);
        assert!(!first.is_accepted());
    }
}
