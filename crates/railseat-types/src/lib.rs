//! Shared vocabulary types for the RailSeat reservation workspace.
//!
//! This crate is deliberately small: it defines the ticket-id newtype and the
//! immutable ticket record exchanged between the allocator and its callers.
//! No algorithm lives here.

use std::fmt;

/// A ticket identifier.
///
/// Ids are drawn from a single monotonically increasing counter shared by all
/// routes of a reservation system, bumped exactly once per successful
/// purchase and never reused. Valid ids are always ≥ 1; 0 means "never
/// issued" and is never returned by the allocator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct TicketId(u64);

impl TicketId {
    /// Create a ticket id from a raw u64.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An issued ticket.
///
/// Immutable after construction. A ticket reserves one seat for the half-open
/// station segment `[departure, arrival)` on one route. All positional fields
/// are 1-based, matching the public interface contract.
///
/// The allocator keeps its own copy of every active ticket and validates a
/// refund request field-by-field against it, so mutating a clone of this
/// record does not grant the ability to free someone else's seat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Ticket {
    /// Globally ordered ticket id (≥ 1).
    pub id: TicketId,
    /// Passenger name as supplied to `buy`.
    pub passenger: String,
    /// Route number (1-based).
    pub route: u32,
    /// Coach number within the route (1-based).
    pub coach: u32,
    /// Seat number within the coach (1-based).
    pub seat: u32,
    /// Departure station (1-based).
    pub departure: u32,
    /// Arrival station (1-based, strictly greater than `departure`).
    pub arrival: u32,
}
