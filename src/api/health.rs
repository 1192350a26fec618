//! Shared health state for the /health endpoint.
//! Updated by the cycle coordinator, read by the API.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

/// Shared cycle metrics. The in-flight flag doubles as the single-flight
/// guard for report cycles.
#[derive(Default)]
pub struct HealthState {
    /// True while a cycle holds the guard.
    cycle_in_flight: AtomicBool,
    cycles_completed: AtomicU64,
    /// Millisecond timestamp of the last completed cycle (0 = none).
    last_cycle_at_ms: AtomicI64,
    reports_emitted: AtomicU64,
}

/// Releases the in-flight flag on drop, including on panic unwinds.
pub struct CycleGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the cycle slot. None if a cycle is already running.
    pub fn try_begin_cycle(&self) -> Option<CycleGuard<'_>> {
        self.cycle_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard { flag: &self.cycle_in_flight })
    }

    pub fn record_cycle(&self, finished_at_ms: i64, emitted: u64) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_at_ms.store(finished_at_ms, Ordering::Relaxed);
        self.reports_emitted.fetch_add(emitted, Ordering::Relaxed);
    }

    pub fn cycle_in_flight(&self) -> bool {
        self.cycle_in_flight.load(Ordering::Acquire)
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn last_cycle_at_ms(&self) -> i64 {
        self.last_cycle_at_ms.load(Ordering::Relaxed)
    }

    pub fn reports_emitted(&self) -> u64 {
        self.reports_emitted.load(Ordering::Relaxed)
    }
}
