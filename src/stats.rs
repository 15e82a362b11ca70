//! Reconciliation cycle statistics

use std::time::{Duration, Instant};

/// Outcome counts of one reconciliation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Servers probed this cycle
    pub hosts_checked: usize,

    /// Servers found unsealed
    pub unsealed: usize,

    /// Servers found sealed
    pub sealed: usize,

    /// Health probes that failed
    pub unreachable: usize,

    pub unseal_succeeded: usize,

    pub unseal_failed: usize,

    /// Time taken to complete the cycle
    pub duration: Option<Duration>,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when every reachable sealed server was unsealed
    pub fn fleet_healthy(&self) -> bool {
        self.unreachable == 0 && self.unseal_failed == 0
    }

    /// Format a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Cycle: {} hosts | {} unsealed | {} sealed | {} unreachable | Unseal: {} ok, {} failed",
            self.hosts_checked,
            self.unsealed,
            self.sealed,
            self.unreachable,
            self.unseal_succeeded,
            self.unseal_failed
        )
    }
}

/// Accumulates stats while a cycle runs
#[derive(Debug, Clone)]
pub struct CycleStatsBuilder {
    stats: CycleStats,
    start_time: Instant,
}

impl CycleStatsBuilder {
    pub fn new() -> Self {
        Self {
            stats: CycleStats::new(),
            start_time: Instant::now(),
        }
    }

    pub fn record_unsealed(&mut self) {
        self.stats.hosts_checked += 1;
        self.stats.unsealed += 1;
    }

    pub fn record_sealed(&mut self) {
        self.stats.hosts_checked += 1;
        self.stats.sealed += 1;
    }

    pub fn record_unreachable(&mut self) {
        self.stats.hosts_checked += 1;
        self.stats.unreachable += 1;
    }

    pub fn record_unseal_success(&mut self) {
        self.stats.unseal_succeeded += 1;
    }

    pub fn record_unseal_failure(&mut self) {
        self.stats.unseal_failed += 1;
    }

    /// Finalize and return the stats
    pub fn finish(mut self) -> CycleStats {
        self.stats.duration = Some(self.start_time.elapsed());
        self.stats
    }
}

impl Default for CycleStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
