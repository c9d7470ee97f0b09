//! Per-route seat occupancy: one atomic bitmask per seat, plus the
//! route-wide shared/exclusive lock tiers.
//!
//! A seat's occupancy is a `u64` with one bit per inter-station segment: bit
//! *i* set means the leg between stations *i+1* and *i+2* is reserved. The
//! atomic word is the only source of truth; callers re-read it immediately
//! before every compare-and-set and never cache it across attempts.
//!
//! The table owns no business logic. Purchase and refund protocols live in
//! [`crate::system`]; this module only provides controlled access to the
//! slots and the two lock tiers:
//!
//! - **Exclusive tier** ([`RouteOccupancy::with_exclusive`]): mutually
//!   exclusive with all shared holders and other exclusive holders. Used by
//!   the fallback purchase scan.
//! - **Shared tier** ([`RouteOccupancy::with_shared`]): concurrent with other
//!   shared holders. Used by refunds, which must not serialize on one lock.
//!
//! Neither tier excludes lock-free CAS attempts on the masks themselves;
//! those are individually linearizable and need no lock.
//!
//! This implementation uses only atomics and `parking_lot` locks — no
//! `UnsafeCell`, no `unsafe`.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use railseat_types::Ticket;

/// Maximum number of inter-station segments per route (bits in one mask).
pub const MAX_SEGMENTS: u32 = u64::BITS;

/// Bitmask covering the half-open station segment `[departure, arrival)`.
///
/// Sets exactly bits `departure-1 ..= arrival-2`. This is the canonical
/// encoding shared by purchase, inquiry, and refund.
///
/// Requires `1 <= departure < arrival <= MAX_SEGMENTS + 1`; validated by the
/// caller.
#[inline]
#[must_use]
pub const fn segment_mask(departure: u32, arrival: u32) -> u64 {
    // `(1 << (arrival-1)) - (1 << (departure-1))`, written via two low-bit
    // masks so that arrival = 65 (all 64 bits) does not overflow the shift.
    let upper = if arrival - 1 >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << (arrival - 1)) - 1
    };
    let lower = (1u64 << (departure - 1)) - 1;
    upper & !lower
}

// ---------------------------------------------------------------------------
// SeatSlot
// ---------------------------------------------------------------------------

/// One physical seat's occupancy across all stations of its route.
///
/// Cache-line aligned so adjacent seats scanned by different threads do not
/// false-share. The hot field is the atomic mask; the holder slots are cold
/// (touched once per purchase/refund, under their own mutex).
#[repr(C, align(64))]
struct SeatSlot {
    /// Occupancy bitmask. The only source of truth for this seat.
    occupancy: AtomicU64,
    /// Active ticket per departure station, used solely to validate refunds.
    ///
    /// Written only immediately after a successful CAS on `occupancy` for
    /// the same seat; the atomic mask serializes visibility for subsequent
    /// operations on the slot.
    holders: Box<[Mutex<Option<Ticket>>]>,
}

impl SeatSlot {
    fn new(stations: u32) -> Self {
        Self {
            occupancy: AtomicU64::new(0),
            holders: (0..stations).map(|_| Mutex::new(None)).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// RouteOccupancy
// ---------------------------------------------------------------------------

/// Fixed-size seat state for one route.
///
/// Created once with fixed dimensions and never resized. Seat indexes are
/// 0-based: `(coach-1) * seats_per_coach + (seat-1)`.
pub struct RouteOccupancy {
    seats: Box<[SeatSlot]>,
    /// Route-wide lock backing the two tiers. Guards nothing by itself; the
    /// exclusive/shared contract is between fallback purchases and refunds.
    tier: RwLock<()>,
}

impl RouteOccupancy {
    /// Create a route with `seat_count` empty seats and `stations` stations.
    #[must_use]
    pub fn new(seat_count: u32, stations: u32) -> Self {
        Self {
            seats: (0..seat_count).map(|_| SeatSlot::new(stations)).collect(),
            tier: RwLock::new(()),
        }
    }

    /// Total seats on this route. Constant after construction.
    #[inline]
    #[must_use]
    pub fn seat_count(&self) -> usize {
        self.seats.len()
    }

    /// Current occupancy snapshot for one seat.
    ///
    /// No ordering guarantee relative to concurrent writers beyond the
    /// caller's own synchronization.
    #[inline]
    #[must_use]
    pub fn read_mask(&self, seat: usize) -> u64 {
        self.seats[seat].occupancy.load(Ordering::Acquire)
    }

    /// Atomically replace the mask iff it still equals `expected`.
    ///
    /// Never blocks and never retries; a failure leaves the mask untouched.
    #[inline]
    pub fn compare_and_set_mask(&self, seat: usize, expected: u64, new: u64) -> bool {
        self.seats[seat]
            .occupancy
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Record the ticket occupying `seat` with the given departure index.
    ///
    /// Contract: called only right after a successful
    /// [`compare_and_set_mask`](Self::compare_and_set_mask) on the same seat.
    pub fn record_holder(&self, seat: usize, departure_ix: usize, ticket: Ticket) {
        *self.seats[seat].holders[departure_ix].lock() = Some(ticket);
    }

    /// Clear the holder slot after a successful refund CAS.
    pub fn clear_holder(&self, seat: usize, departure_ix: usize) {
        *self.seats[seat].holders[departure_ix].lock() = None;
    }

    /// Field-by-field identity check of a presented ticket against the
    /// stored holder. An empty slot never matches.
    #[must_use]
    pub fn holder_matches(&self, seat: usize, departure_ix: usize, ticket: &Ticket) -> bool {
        self.seats[seat].holders[departure_ix].lock().as_ref() == Some(ticket)
    }

    /// Run `f` under the route's exclusive tier.
    ///
    /// Excludes all shared holders and other exclusive holders; does NOT
    /// exclude concurrent CAS attempts on the masks. Released on all exit
    /// paths (guard-based).
    pub fn with_exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.tier.write();
        f()
    }

    /// Run `f` under the route's shared tier.
    ///
    /// Concurrent with other shared holders; excluded only by an exclusive
    /// holder. Released on all exit paths.
    pub fn with_shared<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.tier.read();
        f()
    }
}

impl std::fmt::Debug for RouteOccupancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteOccupancy")
            .field("seat_count", &self.seats.len())
            .finish_non_exhaustive()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
