//! Globally ordered ticket-id counter.
//!
//! One counter is shared by all routes of a reservation system — a deliberate
//! serialization point, acceptable because a `fetch_add` is the entire
//! critical section. Ids are drawn only after a purchase has won its seat
//! CAS, so every issued id corresponds to exactly one successful purchase.
//! Refund never returns or decrements an id.

use std::sync::atomic::{AtomicU64, Ordering};

use railseat_types::TicketId;

/// Monotonic ticket-id source. Ids are always ≥ 1 and never reused.
#[derive(Debug, Default)]
pub struct TicketIdCounter {
    issued: AtomicU64,
}

impl TicketIdCounter {
    /// Create a counter that has issued nothing yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            issued: AtomicU64::new(0),
        }
    }

    /// Draw the next id. Lock-free; a single atomic increment.
    ///
    /// Relaxed ordering suffices: uniqueness and monotonicity come from the
    /// atomic RMW itself, and the id is published to other threads inside a
    /// ticket, not through this counter.
    #[inline]
    pub fn allocate(&self) -> TicketId {
        TicketId::new(self.issued.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Number of ids issued so far (diagnostics and tests).
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    // ── 1. sequential monotonicity ──

    #[test]
    fn ids_start_at_one_and_increase() {
        let counter = TicketIdCounter::new();
        let ids: Vec<_> = (0..10).map(|_| counter.allocate()).collect();

        assert_eq!(ids[0].get(), 1);
        for window in ids.windows(2) {
            assert!(window[1] > window[0], "must be monotone");
        }
        assert_eq!(counter.issued(), 10);
    }

    // ── 2. concurrent uniqueness ──

    #[test]
    fn concurrent_allocation_never_duplicates() {
        let counter = Arc::new(TicketIdCounter::new());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                let mut ids = Vec::with_capacity(1000);
                for _ in 0..1000 {
                    ids.push(counter.allocate());
                }
                ids
            }));
        }

        let mut all_ids = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(id.get() >= 1);
                assert!(all_ids.insert(id.get()), "duplicate id {id}");
            }
        }
        assert_eq!(all_ids.len(), 4000);
        assert_eq!(counter.issued(), 4000);
    }
}
