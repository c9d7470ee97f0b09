//! The seat allocator: purchase, inquiry, and refund against the per-route
//! occupancy tables.
//!
//! ## Purchase protocol
//!
//! `buy` runs a lock-free optimistic pass first: scan seats in index order,
//! and for each seat whose current mask does not overlap the requested
//! segment, attempt one compare-and-set. The first won CAS claims the seat;
//! a lost CAS moves on to the next seat, never retrying the same one within
//! a call. Only when the whole pass comes up empty does the buyer take the
//! route's exclusive tier and repeat the identical scan once. The exclusive
//! tier bounds retries under contention to one extra scan per caller — it is
//! not a correctness requirement for the CAS itself.
//!
//! ## Lock-tier contract
//!
//! The exclusive tier excludes all refunds (shared tier) and all other
//! fallback buyers. It does NOT exclude optimistic CAS attempts by
//! concurrent buyers: those carry no lock, and each individual CAS stays
//! linearizable regardless. Tests pin this asymmetry; do not "fix" it by
//! widening the lock.
//!
//! ## Refund protocol
//!
//! Refund trusts nothing in the presented ticket: every positional field is
//! range-checked (malformed input yields `false`, never a panic), the
//! recomputed segment bits must all be set, and the ticket must match the
//! stored holder field by field. The clearing CAS runs under the shared
//! tier, so independent refunds proceed concurrently while a fallback scan
//! holds them off. A lost CAS reports `false`; refund is never retried
//! internally.

use railseat_error::{ConfigError, ReserveError};
use railseat_types::Ticket;
use tracing::{debug, trace};

use crate::metrics;
use crate::occupancy::{MAX_SEGMENTS, RouteOccupancy, segment_mask};
use crate::ticket_id::TicketIdCounter;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fixed dimensions of a reservation system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemConfig {
    /// Number of routes (transit lines).
    pub routes: u32,
    /// Coaches per route.
    pub coaches_per_route: u32,
    /// Seats per coach.
    pub seats_per_coach: u32,
    /// Stations per route (at least 2, at most `MAX_SEGMENTS + 1`).
    pub stations: u32,
    /// Expected number of concurrent callers. Advisory only: logged at
    /// construction, never consulted for correctness.
    pub thread_hint: u32,
}

impl SystemConfig {
    /// Validate the dimensions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.routes == 0 {
            return Err(ConfigError::ZeroDimension { field: "routes" });
        }
        if self.coaches_per_route == 0 {
            return Err(ConfigError::ZeroDimension {
                field: "coaches_per_route",
            });
        }
        if self.seats_per_coach == 0 {
            return Err(ConfigError::ZeroDimension {
                field: "seats_per_coach",
            });
        }
        if self.stations < 2 {
            return Err(ConfigError::TooFewStations {
                stations: self.stations,
            });
        }
        if self.stations - 1 > MAX_SEGMENTS {
            return Err(ConfigError::TooManyStations {
                stations: self.stations,
                segments: self.stations - 1,
                limit: MAX_SEGMENTS,
            });
        }
        if self
            .coaches_per_route
            .checked_mul(self.seats_per_coach)
            .is_none()
        {
            return Err(ConfigError::TooManySeats {
                coaches: self.coaches_per_route,
                seats_per_coach: self.seats_per_coach,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Interface contract
// ---------------------------------------------------------------------------

/// The system-wide reservation interface.
///
/// All positional arguments are 1-based. Implementations must be safe to
/// call from many threads at once.
pub trait TicketingSystem {
    /// Claim one seat covering `[departure, arrival)` on `route`.
    fn buy(
        &self,
        passenger: &str,
        route: u32,
        departure: u32,
        arrival: u32,
    ) -> Result<Ticket, ReserveError>;

    /// Count seats whose current mask does not overlap the segment.
    ///
    /// Best-effort, weakly consistent: concurrent purchases and refunds may
    /// change the true count before the call returns.
    fn inquiry(&self, route: u32, departure: u32, arrival: u32) -> Result<u32, ReserveError>;

    /// Release the seat held by `ticket`. `false` on any validation failure,
    /// lost race, or already-refunded ticket; sub-reasons are never
    /// distinguished.
    fn refund(&self, ticket: &Ticket) -> bool;

    /// Idempotency hook for a surrounding replay system. Always succeeds.
    fn buy_ticket_replay(&self, _ticket: &Ticket) -> bool {
        true
    }

    /// Idempotency hook for a surrounding replay system. Always succeeds.
    fn refund_ticket_replay(&self, _ticket: &Ticket) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// SeatReservation
// ---------------------------------------------------------------------------

/// Concurrent seat-reservation state for a multi-route network.
///
/// Owns one [`RouteOccupancy`] per route and the shared ticket-id counter.
/// Created once with fixed dimensions; never resized.
#[derive(Debug)]
pub struct SeatReservation {
    routes: Box<[RouteOccupancy]>,
    ids: TicketIdCounter,
    coaches_per_route: u32,
    seats_per_coach: u32,
    stations: u32,
}

impl SeatReservation {
    /// Build a system from validated dimensions.
    pub fn new(config: SystemConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let seat_count = config.coaches_per_route * config.seats_per_coach;

        debug!(
            routes = config.routes,
            seat_count,
            stations = config.stations,
            thread_hint = config.thread_hint,
            "reservation system initialized"
        );

        Ok(Self {
            routes: (0..config.routes)
                .map(|_| RouteOccupancy::new(seat_count, config.stations))
                .collect(),
            ids: TicketIdCounter::new(),
            coaches_per_route: config.coaches_per_route,
            seats_per_coach: config.seats_per_coach,
            stations: config.stations,
        })
    }

    /// Number of routes in the system.
    #[must_use]
    pub fn route_count(&self) -> u32 {
        self.routes.len() as u32
    }

    /// Total ids issued so far (diagnostics).
    #[must_use]
    pub fn tickets_issued(&self) -> u64 {
        self.ids.issued()
    }

    /// Validate a `(route, departure, arrival)` request and resolve the route.
    fn resolve(
        &self,
        route: u32,
        departure: u32,
        arrival: u32,
    ) -> Result<&RouteOccupancy, ReserveError> {
        if route == 0 || route as usize > self.routes.len() {
            return Err(ReserveError::UnknownRoute {
                route,
                routes: self.routes.len() as u32,
            });
        }
        if departure == 0 || arrival <= departure || arrival > self.stations {
            return Err(ReserveError::InvalidSegment {
                departure,
                arrival,
                stations: self.stations,
            });
        }
        Ok(&self.routes[route as usize - 1])
    }

    /// One scan-and-CAS pass over a route's seats in index order.
    ///
    /// Returns the claimed seat index, or `None` if every seat either
    /// conflicted with `target` or lost its CAS to a concurrent writer. A
    /// lost CAS is not retried on the same seat within a pass.
    fn scan_and_claim(occ: &RouteOccupancy, target: u64) -> Option<usize> {
        for seat in 0..occ.seat_count() {
            let mask = occ.read_mask(seat);
            if mask & target != 0 {
                continue;
            }
            if occ.compare_and_set_mask(seat, mask, mask | target) {
                return Some(seat);
            }
            metrics::note_cas_loss();
        }
        None
    }

    /// Allocate an id, build the ticket, and record it in the holder slot.
    ///
    /// Called only right after a successful claiming CAS on `seat_ix`.
    fn issue(
        &self,
        occ: &RouteOccupancy,
        route: u32,
        seat_ix: usize,
        passenger: &str,
        departure: u32,
        arrival: u32,
    ) -> Ticket {
        let ticket = Ticket {
            id: self.ids.allocate(),
            passenger: passenger.to_owned(),
            route,
            coach: seat_ix as u32 / self.seats_per_coach + 1,
            seat: seat_ix as u32 % self.seats_per_coach + 1,
            departure,
            arrival,
        };
        occ.record_holder(seat_ix, departure as usize - 1, ticket.clone());

        trace!(
            id = ticket.id.get(),
            route,
            coach = ticket.coach,
            seat = ticket.seat,
            departure,
            arrival,
            "ticket issued"
        );
        ticket
    }

    /// Range-check every positional field of a presented refund ticket and
    /// compute its seat index. Malformed input yields `None`, never a panic.
    fn refund_coordinates(&self, ticket: &Ticket) -> Option<(usize, usize, u64)> {
        if ticket.route == 0 || ticket.route as usize > self.routes.len() {
            return None;
        }
        if ticket.departure == 0
            || ticket.arrival <= ticket.departure
            || ticket.arrival > self.stations
        {
            return None;
        }
        if ticket.coach == 0
            || ticket.coach > self.coaches_per_route
            || ticket.seat == 0
            || ticket.seat > self.seats_per_coach
        {
            return None;
        }
        let seat_ix = ((ticket.coach - 1) * self.seats_per_coach + ticket.seat - 1) as usize;
        let departure_ix = ticket.departure as usize - 1;
        let target = segment_mask(ticket.departure, ticket.arrival);
        Some((seat_ix, departure_ix, target))
    }
}

impl TicketingSystem for SeatReservation {
    fn buy(
        &self,
        passenger: &str,
        route: u32,
        departure: u32,
        arrival: u32,
    ) -> Result<Ticket, ReserveError> {
        let occ = self.resolve(route, departure, arrival)?;
        let target = segment_mask(departure, arrival);

        // Optimistic pass: no synchronization overhead; dominates whenever
        // spare capacity exists.
        if let Some(seat_ix) = Self::scan_and_claim(occ, target) {
            return Ok(self.issue(occ, route, seat_ix, passenger, departure, arrival));
        }

        // Fallback: one bounded rescan under the exclusive tier, shielded
        // from refunds and from other fallback buyers.
        metrics::note_fallback_scan();
        debug!(route, departure, arrival, "optimistic pass empty, taking exclusive tier");

        let claimed = occ.with_exclusive(|| Self::scan_and_claim(occ, target));
        match claimed {
            Some(seat_ix) => Ok(self.issue(occ, route, seat_ix, passenger, departure, arrival)),
            None => Err(ReserveError::SoldOut {
                route,
                departure,
                arrival,
            }),
        }
    }

    fn inquiry(&self, route: u32, departure: u32, arrival: u32) -> Result<u32, ReserveError> {
        let occ = self.resolve(route, departure, arrival)?;
        let target = segment_mask(departure, arrival);

        let mut free = 0u32;
        for seat in 0..occ.seat_count() {
            if occ.read_mask(seat) & target == 0 {
                free += 1;
            }
        }
        Ok(free)
    }

    fn refund(&self, ticket: &Ticket) -> bool {
        let Some((seat_ix, departure_ix, target)) = self.refund_coordinates(ticket) else {
            metrics::note_refund_rejected();
            debug!(id = ticket.id.get(), "refund rejected: malformed ticket");
            return false;
        };
        let occ = &self.routes[ticket.route as usize - 1];

        // The segment must be fully reserved right now; anything else means
        // the ticket was already refunded, forged, or never valid here.
        let mask = occ.read_mask(seat_ix);
        if mask & target != target {
            metrics::note_refund_rejected();
            debug!(id = ticket.id.get(), "refund rejected: segment not active");
            return false;
        }

        if !occ.holder_matches(seat_ix, departure_ix, ticket) {
            metrics::note_refund_rejected();
            debug!(id = ticket.id.get(), "refund rejected: holder mismatch");
            return false;
        }

        // Shared tier: concurrent with other refunds, excluded only by a
        // fallback purchase scan. One CAS attempt; a lost race is the
        // caller's problem to retry.
        let cleared = occ.with_shared(|| {
            if occ.compare_and_set_mask(seat_ix, mask, mask & !target) {
                occ.clear_holder(seat_ix, departure_ix);
                true
            } else {
                false
            }
        });

        if !cleared {
            metrics::note_refund_rejected();
            debug!(id = ticket.id.get(), "refund rejected: lost clearing race");
        }
        cleared
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn small_system() -> SeatReservation {
        // 1 coach x 2 seats, 4 stations: the smallest interesting network.
        SeatReservation::new(SystemConfig {
            routes: 1,
            coaches_per_route: 1,
            seats_per_coach: 2,
            stations: 4,
            thread_hint: 1,
        })
        .unwrap()
    }

    // ── 1. construction validation ──

    #[test]
    fn construction_rejects_bad_dimensions() {
        let base = SystemConfig {
            routes: 1,
            coaches_per_route: 1,
            seats_per_coach: 1,
            stations: 2,
            thread_hint: 0,
        };

        assert!(SeatReservation::new(base).is_ok());
        assert!(SeatReservation::new(SystemConfig { routes: 0, ..base }).is_err());
        assert!(
            SeatReservation::new(SystemConfig {
                coaches_per_route: 0,
                ..base
            })
            .is_err()
        );
        assert!(SeatReservation::new(SystemConfig { stations: 1, ..base }).is_err());
        assert!(
            SeatReservation::new(SystemConfig {
                stations: MAX_SEGMENTS + 2,
                ..base
            })
            .is_err()
        );
        // 65 stations (64 segments) is the widest supported route.
        assert!(
            SeatReservation::new(SystemConfig {
                stations: MAX_SEGMENTS + 1,
                ..base
            })
            .is_ok()
        );
    }

    // ── 2. the concrete two-seat scenario ──

    #[test]
    fn two_seat_four_station_scenario() {
        let sys = small_system();

        assert_eq!(sys.inquiry(1, 1, 3).unwrap(), 2);

        let alice = sys.buy("alice", 1, 1, 3).unwrap();
        assert_eq!(alice.departure, 1);
        assert_eq!(alice.arrival, 3);
        assert_eq!(alice.route, 1);
        assert_eq!(sys.inquiry(1, 1, 3).unwrap(), 1);

        // Bob's [2, 4) conflicts with alice's seat on segment 1, so both
        // tickets must land on different seats.
        let bob = sys.buy("bob", 1, 2, 4).unwrap();
        assert_ne!((alice.coach, alice.seat), (bob.coach, bob.seat));

        // Both seats now block [2, 3).
        assert_eq!(sys.inquiry(1, 2, 3).unwrap(), 0);
        assert!(matches!(
            sys.buy("carol", 1, 2, 3),
            Err(ReserveError::SoldOut { .. })
        ));

        assert!(sys.refund(&alice));
        assert_eq!(sys.inquiry(1, 1, 3).unwrap(), 2);
    }

    // ── 3. conservation across buy/refund ──

    #[test]
    fn inquiry_decreases_by_one_per_buy() {
        let sys = small_system();

        let before = sys.inquiry(1, 2, 4).unwrap();
        assert_eq!(before, 2);
        let t = sys.buy("p", 1, 2, 4).unwrap();
        assert_eq!(sys.inquiry(1, 2, 4).unwrap(), before - 1);
        assert!(sys.refund(&t));
        assert_eq!(sys.inquiry(1, 2, 4).unwrap(), before);
    }

    // ── 4. refund round-trip and double refund ──

    #[test]
    fn second_refund_of_same_ticket_fails() {
        let sys = small_system();
        let t = sys.buy("p", 1, 1, 4).unwrap();

        assert!(sys.refund(&t));
        assert!(!sys.refund(&t), "a refunded ticket is no longer valid");
        assert_eq!(sys.inquiry(1, 1, 4).unwrap(), 2);
    }

    // ── 5. forged tickets ──

    #[test]
    fn forged_tickets_are_rejected_without_state_change() {
        let sys = small_system();
        let t = sys.buy("alice", 1, 1, 3).unwrap();
        let before = sys.inquiry(1, 1, 3).unwrap();

        let mut passenger = t.clone();
        passenger.passenger = "mallory".to_owned();
        assert!(!sys.refund(&passenger));

        let mut id = t.clone();
        id.id = railseat_types::TicketId::new(id.id.get() + 1);
        assert!(!sys.refund(&id));

        // Out-of-range fields must fail cleanly, not fault.
        let mut coach = t.clone();
        coach.coach = 99;
        assert!(!sys.refund(&coach));

        let mut arrival = t.clone();
        arrival.arrival = 999;
        assert!(!sys.refund(&arrival));

        let mut route = t.clone();
        route.route = 0;
        assert!(!sys.refund(&route));

        assert_eq!(sys.inquiry(1, 1, 3).unwrap(), before);
        assert!(sys.refund(&t), "the genuine ticket still refunds");
    }

    // ── 6. a refund for a never-issued segment fails ──

    #[test]
    fn refund_of_unreserved_segment_fails() {
        let sys = small_system();
        let t = sys.buy("p", 1, 1, 2).unwrap();

        // Same seat, wider segment: bits [1, 3) are not all set.
        let mut wider = t.clone();
        wider.arrival = 4;
        assert!(!sys.refund(&wider));
        assert!(sys.refund(&t));
    }

    // ── 7. argument validation ──

    #[test]
    fn buy_and_inquiry_validate_arguments() {
        let sys = small_system();

        assert!(matches!(
            sys.buy("p", 2, 1, 3),
            Err(ReserveError::UnknownRoute { .. })
        ));
        assert!(matches!(
            sys.buy("p", 1, 3, 3),
            Err(ReserveError::InvalidSegment { .. })
        ));
        assert!(matches!(
            sys.buy("p", 1, 0, 2),
            Err(ReserveError::InvalidSegment { .. })
        ));
        assert!(matches!(
            sys.inquiry(1, 1, 5),
            Err(ReserveError::InvalidSegment { .. })
        ));
    }

    // ── 8. ids are unique and strictly increasing ──

    #[test]
    fn ticket_ids_increase_across_routes() {
        let sys = SeatReservation::new(SystemConfig {
            routes: 3,
            coaches_per_route: 1,
            seats_per_coach: 2,
            stations: 3,
            thread_hint: 1,
        })
        .unwrap();

        let a = sys.buy("p", 1, 1, 2).unwrap();
        let b = sys.buy("p", 3, 1, 2).unwrap();
        let c = sys.buy("p", 2, 2, 3).unwrap();
        assert!(a.id < b.id && b.id < c.id);
        assert_eq!(sys.tickets_issued(), 3);
    }

    // ── 9. seat index mapping ──

    #[test]
    fn coach_and_seat_numbers_come_from_the_seat_index() {
        let sys = SeatReservation::new(SystemConfig {
            routes: 1,
            coaches_per_route: 2,
            seats_per_coach: 3,
            stations: 2,
            thread_hint: 1,
        })
        .unwrap();

        // First-fit claims seat indexes 0..6 in order.
        let expected = [(1, 1), (1, 2), (1, 3), (2, 1), (2, 2), (2, 3)];
        for (coach, seat) in expected {
            let t = sys.buy("p", 1, 1, 2).unwrap();
            assert_eq!((t.coach, t.seat), (coach, seat));
        }
        assert!(sys.buy("p", 1, 1, 2).is_err());
    }

    // ── 10. replay stubs ──

    #[test]
    fn replay_hooks_always_succeed() {
        let sys = small_system();
        let t = sys.buy("p", 1, 1, 2).unwrap();
        assert!(sys.buy_ticket_replay(&t));
        assert!(sys.refund_ticket_replay(&t));
        // Replay hooks touch no state.
        assert!(sys.refund(&t));
    }

    // ── 11. the exclusive tier does not block optimistic buys ──

    #[test]
    fn exclusive_tier_does_not_block_optimistic_buys() {
        let sys = small_system();

        // Holding route 1's exclusive tier on this very thread: a buy with
        // spare capacity must complete on its optimistic (lock-free) pass.
        // The parking_lot write lock is not reentrant, so this would
        // deadlock if the optimistic path ever touched the lock.
        let ticket = sys.routes[0].with_exclusive(|| sys.buy("p", 1, 1, 4));
        assert!(ticket.is_ok());
    }

    // ── 12. sequential model equivalence (proptest) ──

    #[derive(Debug, Clone)]
    enum Op {
        Buy(u32, u32),
        Refund(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (1u32..=5, 1u32..=5)
                .prop_filter("distinct stations", |(a, b)| a != b)
                .prop_map(|(a, b)| Op::Buy(a.min(b), a.max(b))),
            1 => (0usize..8).prop_map(Op::Refund),
        ]
    }

    proptest! {
        /// Single-threaded, the allocator behaves exactly like first-fit on
        /// a plain vector of masks: same buy outcomes, same chosen seats,
        /// same inquiry counts, and refunds restore the model state.
        #[test]
        fn matches_first_fit_model(ops in prop::collection::vec(op_strategy(), 1..48)) {
            const SEATS: usize = 3;
            let sys = SeatReservation::new(SystemConfig {
                routes: 1,
                coaches_per_route: 1,
                seats_per_coach: SEATS as u32,
                stations: 5,
                thread_hint: 1,
            })
            .unwrap();

            let mut model = [0u64; SEATS];
            let mut outstanding: Vec<(usize, Ticket)> = Vec::new();

            for op in ops {
                match op {
                    Op::Buy(departure, arrival) => {
                        let target = segment_mask(departure, arrival);
                        let model_seat =
                            (0..SEATS).find(|&s| model[s] & target == 0);
                        let got = sys.buy("p", 1, departure, arrival);

                        match model_seat {
                            Some(seat) => {
                                let t = got.expect("model says a seat is free");
                                prop_assert_eq!(
                                    (t.coach, t.seat),
                                    (1, seat as u32 + 1),
                                    "first-fit seat choice"
                                );
                                model[seat] |= target;
                                outstanding.push((seat, t));
                            }
                            None => {
                                let sold_out = matches!(
                                    got,
                                    Err(ReserveError::SoldOut { .. })
                                );
                                prop_assert!(sold_out);
                            }
                        }

                        let model_free =
                            (0..SEATS).filter(|&s| model[s] & target == 0).count();
                        prop_assert_eq!(
                            sys.inquiry(1, departure, arrival).unwrap() as usize,
                            model_free
                        );
                    }
                    Op::Refund(pick) => {
                        if outstanding.is_empty() {
                            continue;
                        }
                        let (seat, t) = outstanding.remove(pick % outstanding.len());
                        prop_assert!(sys.refund(&t));
                        model[seat] &= !segment_mask(t.departure, t.arrival);
                        prop_assert!(!sys.refund(&t), "double refund must fail");
                    }
                }
            }

            // Drain: after refunding everything, every segment is free.
            for (_, t) in outstanding.drain(..) {
                prop_assert!(sys.refund(&t));
            }
            prop_assert_eq!(sys.inquiry(1, 1, 5).unwrap(), SEATS as u32);
        }
    }
}
