//! Allocator metrics (lock-free, Relaxed ordering).
//!
//! Purely diagnostic process-wide counters: the algorithms never consult
//! them, and callers that want per-system numbers should reset between runs.
//!
//! - `railseat_cas_losses_total`: optimistic purchase CAS attempts that lost
//!   to a concurrent writer on the same seat.
//! - `railseat_fallback_scans_total`: purchases that exhausted the optimistic
//!   pass and entered the exclusive fallback scan.
//! - `railseat_refunds_rejected_total`: refund requests rejected by
//!   validation or by a lost CAS.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

static RAILSEAT_CAS_LOSSES_TOTAL: AtomicU64 = AtomicU64::new(0);
static RAILSEAT_FALLBACK_SCANS_TOTAL: AtomicU64 = AtomicU64::new(0);
static RAILSEAT_REFUNDS_REJECTED_TOTAL: AtomicU64 = AtomicU64::new(0);

pub(crate) fn note_cas_loss() {
    RAILSEAT_CAS_LOSSES_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn note_fallback_scan() {
    RAILSEAT_FALLBACK_SCANS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn note_refund_rejected() {
    RAILSEAT_REFUNDS_REJECTED_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Snapshot of allocator metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllocatorMetrics {
    pub railseat_cas_losses_total: u64,
    pub railseat_fallback_scans_total: u64,
    pub railseat_refunds_rejected_total: u64,
}

/// Read current allocator metrics.
#[must_use]
pub fn allocator_metrics() -> AllocatorMetrics {
    AllocatorMetrics {
        railseat_cas_losses_total: RAILSEAT_CAS_LOSSES_TOTAL.load(Ordering::Relaxed),
        railseat_fallback_scans_total: RAILSEAT_FALLBACK_SCANS_TOTAL.load(Ordering::Relaxed),
        railseat_refunds_rejected_total: RAILSEAT_REFUNDS_REJECTED_TOTAL.load(Ordering::Relaxed),
    }
}

/// Reset metrics (for tests).
pub fn reset_allocator_metrics() {
    RAILSEAT_CAS_LOSSES_TOTAL.store(0, Ordering::Relaxed);
    RAILSEAT_FALLBACK_SCANS_TOTAL.store(0, Ordering::Relaxed);
    RAILSEAT_REFUNDS_REJECTED_TOTAL.store(0, Ordering::Relaxed);
}
