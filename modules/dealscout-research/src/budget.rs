use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

/// Micro-USD fixed point so concurrent accounting stays atomic.
fn to_micro(usd: f64) -> u64 {
    (usd.max(0.0) * 1_000_000.0).round() as u64
}

fn to_usd(micro: u64) -> f64 {
    micro as f64 / 1_000_000.0
}

/// Tracks spend against a per-session cost ceiling.
/// Thread-safe via atomic operations for concurrent query workers.
pub struct BudgetTracker {
    /// Ceiling in micro-USD. 0 = unlimited.
    limit_micro: u64,
    /// Cumulative spend (including in-flight reservations) in micro-USD.
    spent_micro: AtomicU64,
    /// Cumulative provider tokens.
    tokens: AtomicU64,
}

impl BudgetTracker {
    pub fn new(max_cost_usd: f64) -> Self {
        Self {
            limit_micro: to_micro(max_cost_usd),
            spent_micro: AtomicU64::new(0),
            tokens: AtomicU64::new(0),
        }
    }

    /// Reserve the estimated cost of a query before dispatch. Returns false
    /// without reserving when the projected total would exceed the ceiling,
    /// so at most one in-flight query's actual-vs-estimate drift can push the
    /// final total past the limit.
    pub fn try_reserve(&self, estimated_usd: f64) -> bool {
        let cost = to_micro(estimated_usd);
        if self.limit_micro == 0 {
            self.spent_micro.fetch_add(cost, Ordering::Relaxed);
            return true;
        }
        let mut current = self.spent_micro.load(Ordering::Relaxed);
        loop {
            if current + cost > self.limit_micro {
                warn!(
                    spent_micro = current,
                    cost_micro = cost,
                    limit_micro = self.limit_micro,
                    "Budget would be exceeded, skipping query"
                );
                return false;
            }
            match self.spent_micro.compare_exchange_weak(
                current,
                current + cost,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Settle a reservation against the actual cost once the query resolved.
    pub fn settle(&self, reserved_usd: f64, actual_usd: f64) {
        let reserved = to_micro(reserved_usd);
        let actual = to_micro(actual_usd);
        if actual >= reserved {
            self.spent_micro.fetch_add(actual - reserved, Ordering::Relaxed);
        } else {
            self.spent_micro.fetch_sub(reserved - actual, Ordering::Relaxed);
        }
    }

    pub fn add_tokens(&self, tokens: u64) {
        self.tokens.fetch_add(tokens, Ordering::Relaxed);
    }

    pub fn total_spent_usd(&self) -> f64 {
        to_usd(self.spent_micro.load(Ordering::Relaxed))
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens.load(Ordering::Relaxed)
    }

    pub fn remaining_usd(&self) -> f64 {
        if self.limit_micro == 0 {
            return f64::MAX;
        }
        to_usd(
            self.limit_micro
                .saturating_sub(self.spent_micro.load(Ordering::Relaxed)),
        )
    }

    /// Log budget status.
    pub fn log_status(&self) {
        if self.limit_micro > 0 {
            info!(
                spent_usd = self.total_spent_usd(),
                remaining_usd = self.remaining_usd(),
                "Budget status"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_budget_always_reserves() {
        let tracker = BudgetTracker::new(0.0);
        assert!(tracker.try_reserve(100.0));
        assert!(tracker.try_reserve(100.0));
    }

    #[test]
    fn budget_tracks_reservations() {
        let tracker = BudgetTracker::new(1.0);
        assert!(tracker.try_reserve(0.5));
        assert!((tracker.total_spent_usd() - 0.5).abs() < 1e-9);
        assert!((tracker.remaining_usd() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn over_budget_reservation_refused_and_not_recorded() {
        let tracker = BudgetTracker::new(1.0);
        assert!(tracker.try_reserve(0.8));
        assert!(!tracker.try_reserve(0.3));
        assert!((tracker.total_spent_usd() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn settle_replaces_estimate_with_actual() {
        let tracker = BudgetTracker::new(1.0);
        assert!(tracker.try_reserve(0.5));
        tracker.settle(0.5, 0.3);
        assert!((tracker.total_spent_usd() - 0.3).abs() < 1e-9);
        tracker.settle(0.0, 0.1);
        assert!((tracker.total_spent_usd() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn tokens_accumulate() {
        let tracker = BudgetTracker::new(1.0);
        tracker.add_tokens(100);
        tracker.add_tokens(250);
        assert_eq!(tracker.tokens_used(), 350);
    }
}
