//! Resource limits for sandboxed runs
//!
//! - [`ExecutionLimits`]: configured bounds (time, operations, sizes)
//! - [`AbortSignal`]: flag the host trips to stop a running interpreter
//! - [`ResourceMeter`]: per-run counter the interpreter ticks on every step

use crate::error::{RunResult, RuntimeError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bounds applied to every run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionLimits {
    /// Wall-clock limit per run
    #[serde(with = "crate::limits::secs_f64")]
    pub timeout: Duration,
    /// Interpreter steps before the run is stopped
    pub max_operations: u64,
    /// Largest list, tuple, string or matrix a program may build
    pub max_collection_len: usize,
    /// Deepest call nesting
    pub max_call_depth: usize,
    /// Largest integer exponent evaluated exactly
    pub max_exponent: u64,
    /// Widest exact numerator or denominator, in bits
    pub max_integer_bits: u64,
    /// Bytes of `print` output kept
    pub max_output_bytes: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_operations: 5_000_000,
            max_collection_len: 100_000,
            max_call_depth: 64,
            max_exponent: 10_000,
            max_integer_bits: 100_000,
            max_output_bytes: 64 * 1024,
        }
    }
}

impl ExecutionLimits {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }
}

/// Why a run was stopped from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Deadline,
    Cancelled,
}

const RUNNING: u8 = 0;
const DEADLINE: u8 = 1;
const CANCELLED: u8 = 2;

/// Shared stop flag; the first reason set wins
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicU8>);

impl AbortSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop; ignored if one was already requested
    pub fn trip(&self, reason: AbortReason) {
        let code = match reason {
            AbortReason::Deadline => DEADLINE,
            AbortReason::Cancelled => CANCELLED,
        };
        let _ = self
            .0
            .compare_exchange(RUNNING, code, Ordering::AcqRel, Ordering::Acquire);
    }

    #[must_use]
    pub fn reason(&self) -> Option<AbortReason> {
        match self.0.load(Ordering::Acquire) {
            DEADLINE => Some(AbortReason::Deadline),
            CANCELLED => Some(AbortReason::Cancelled),
            _ => None,
        }
    }
}

/// How often the wall clock is consulted, in ticks
const CLOCK_STRIDE: u64 = 256;

/// Per-run operation counter and deadline
#[derive(Debug)]
pub struct ResourceMeter {
    limits: ExecutionLimits,
    signal: AbortSignal,
    started: Instant,
    deadline: Instant,
    operations: u64,
}

impl ResourceMeter {
    #[must_use]
    pub fn new(limits: ExecutionLimits, signal: AbortSignal) -> Self {
        let started = Instant::now();
        Self {
            deadline: started + limits.timeout,
            limits,
            signal,
            started,
            operations: 0,
        }
    }

    /// Count one interpreter step
    pub fn tick(&mut self) -> RunResult<()> {
        self.operations += 1;
        if let Some(reason) = self.signal.reason() {
            return Err(match reason {
                AbortReason::Deadline => RuntimeError::Deadline,
                AbortReason::Cancelled => RuntimeError::Cancelled,
            });
        }
        if self.operations > self.limits.max_operations {
            return Err(RuntimeError::BudgetExhausted(self.limits.max_operations));
        }
        if self.operations % CLOCK_STRIDE == 0 && Instant::now() >= self.deadline {
            return Err(RuntimeError::Deadline);
        }
        Ok(())
    }

    /// Count a bulk step, e.g. one element of a builtin that loops natively
    pub fn charge(&mut self, steps: u64) -> RunResult<()> {
        self.operations = self.operations.saturating_add(steps.saturating_sub(1));
        self.tick()
    }

    /// Reject collections over the configured size
    pub fn check_len(&self, len: usize) -> RunResult<()> {
        if len > self.limits.max_collection_len {
            return Err(RuntimeError::limit(format!(
                "collection of {len} items exceeds {}",
                self.limits.max_collection_len
            )));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    #[inline]
    #[must_use]
    pub fn operations(&self) -> u64 {
        self.operations
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Serde adapter storing a [`Duration`] as fractional seconds
pub mod secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Write `d` as seconds
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    /// Read seconds into a duration
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn budget_is_enforced() {
        let limits = ExecutionLimits::default().with_max_operations(3);
        let mut meter = ResourceMeter::new(limits, AbortSignal::new());
        assert!(meter.tick().is_ok());
        assert!(meter.tick().is_ok());
        assert!(meter.tick().is_ok());
        assert!(matches!(meter.tick(), Err(RuntimeError::BudgetExhausted(3))));
    }

    #[test]
    fn first_abort_reason_wins() {
        let signal = AbortSignal::new();
        let mut meter = ResourceMeter::new(ExecutionLimits::default(), signal.clone());
        signal.trip(AbortReason::Cancelled);
        signal.trip(AbortReason::Deadline);
        assert_eq!(signal.reason(), Some(AbortReason::Cancelled));
        assert!(matches!(meter.tick(), Err(RuntimeError::Cancelled)));
    }

    #[test]
    fn limits_from_toml() {
        let limits: ExecutionLimits = toml::from_str("timeout = 0.5\nmax_call_depth = 8\n").unwrap();
        assert_eq!(limits.timeout, Duration::from_millis(500));
        assert_eq!(limits.max_call_depth, 8);
        assert_eq!(limits.max_operations, ExecutionLimits::default().max_operations);
    }
}
