//! Budget Guardian (§4.1 step 3, §5): wall-clock and cost limits checked at
//! pipeline stage boundaries (§2 C4).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use aos_error::{AosError, AosResult, ErrorCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default wall-clock timeout for a pipeline run (§5).
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Enforces a wall-clock timeout and, independently, a cost cap for a single
/// pipeline run.
///
/// Cost is additive across calls to [`Guardian::add_cost`] and starts at
/// zero, mirroring the original guardian (which did not yet wire up cost
/// tracking in v0 — here it is fully implemented but never required: a
/// `budget_usd` of `0.0` disables the cost check entirely).
pub struct Guardian {
    start: Instant,
    timeout: Duration,
    budget_usd: f64,
    cost_so_far_bits: AtomicU64,
}

impl Guardian {
    /// Creates a guardian with `budget_usd` cost cap (`0.0` disables it) and
    /// a `timeout_ms` wall-clock bound, starting the clock now.
    pub fn new(budget_usd: f64, timeout_ms: u64) -> Self {
        Self {
            start: Instant::now(),
            timeout: Duration::from_millis(timeout_ms),
            budget_usd,
            cost_so_far_bits: AtomicU64::new(0.0_f64.to_bits()),
        }
    }

    /// Creates a guardian using the default 120 s timeout.
    pub fn with_budget(budget_usd: f64) -> Self {
        Self::new(budget_usd, DEFAULT_TIMEOUT_MS)
    }

    /// Raises [`ErrorCode::Budget`] if the wall-clock timeout has elapsed.
    pub fn check(&self) -> AosResult<()> {
        let elapsed = self.start.elapsed();
        if elapsed > self.timeout {
            return Err(AosError::new(
                ErrorCode::Budget,
                format!(
                    "stage timeout exceeded: {}ms elapsed, limit {}ms",
                    elapsed.as_millis(),
                    self.timeout.as_millis()
                ),
            )
            .with_context("elapsed_ms", elapsed.as_millis() as u64)
            .with_context("timeout_ms", self.timeout.as_millis() as u64));
        }
        Ok(())
    }

    /// Adds `cost` to the running total and raises [`ErrorCode::Budget`] if
    /// it now exceeds `budget_usd` (when `budget_usd > 0.0`).
    pub fn add_cost(&self, cost: f64) -> AosResult<()> {
        let total = self.cost_so_far(); // snapshot before the CAS loop below
        let new_total = total + cost;
        self.cost_so_far_bits
            .store(new_total.to_bits(), Ordering::SeqCst);
        if self.budget_usd > 0.0 && new_total > self.budget_usd {
            return Err(AosError::new(
                ErrorCode::Budget,
                format!(
                    "cost budget exceeded: ${new_total:.6} accrued, limit ${:.6}",
                    self.budget_usd
                ),
            )
            .with_context("cost_so_far", new_total)
            .with_context("budget_usd", self.budget_usd));
        }
        Ok(())
    }

    /// Total cost accrued so far.
    pub fn cost_so_far(&self) -> f64 {
        f64::from_bits(self.cost_so_far_bits.load(Ordering::SeqCst))
    }

    /// Milliseconds elapsed since the guardian was constructed.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn check_passes_within_timeout() {
        let guardian = Guardian::new(0.0, 50);
        assert!(guardian.check().is_ok());
    }

    #[test]
    fn check_fails_after_timeout_elapses() {
        let guardian = Guardian::new(0.0, 10);
        sleep(Duration::from_millis(30));
        let err = guardian.check().unwrap_err();
        assert_eq!(err.code, ErrorCode::Budget);
    }

    #[test]
    fn cost_budget_of_zero_disables_cost_check() {
        let guardian = Guardian::new(0.0, DEFAULT_TIMEOUT_MS);
        assert!(guardian.add_cost(1_000_000.0).is_ok());
    }

    #[test]
    fn cost_is_additive_across_calls() {
        let guardian = Guardian::new(10.0, DEFAULT_TIMEOUT_MS);
        guardian.add_cost(3.0).unwrap();
        guardian.add_cost(4.0).unwrap();
        assert_eq!(guardian.cost_so_far(), 7.0);
    }

    #[test]
    fn cost_overrun_raises_budget_error() {
        let guardian = Guardian::new(5.0, DEFAULT_TIMEOUT_MS);
        guardian.add_cost(3.0).unwrap();
        let err = guardian.add_cost(3.0).unwrap_err();
        assert_eq!(err.code, ErrorCode::Budget);
    }

    #[test]
    fn starts_at_zero_cost() {
        let guardian = Guardian::with_budget(10.0);
        assert_eq!(guardian.cost_so_far(), 0.0);
    }
}
