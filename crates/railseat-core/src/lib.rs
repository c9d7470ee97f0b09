//! Concurrent seat-occupancy allocation for a multi-route transit network.
//!
//! Each seat carries one atomic occupancy bitmask (a bit per inter-station
//! segment). Purchases claim segments with a lock-free optimistic
//! scan-and-CAS pass, falling back to one bounded rescan under a route-wide
//! exclusive lock when contention empties the optimistic pass. Refunds
//! verify the presented ticket against stored state, then clear the segment
//! bits with a CAS under the route's shared lock tier. Ticket ids come from
//! a single monotonic counter shared by all routes.
//!
//! Everything is in-process and in-memory: no persistence, no transport.
//! Failures are reported as values ([`railseat_error::ReserveError`] or a
//! bare boolean for refunds); the crate logs via `tracing` but installs no
//! subscriber and never alerts.

pub mod metrics;
pub mod occupancy;
pub mod system;
pub mod ticket_id;

pub use metrics::{AllocatorMetrics, allocator_metrics, reset_allocator_metrics};
pub use occupancy::{MAX_SEGMENTS, RouteOccupancy, segment_mask};
pub use railseat_error::{ConfigError, ReserveError};
pub use railseat_types::{Ticket, TicketId};
pub use system::{SeatReservation, SystemConfig, TicketingSystem};
pub use ticket_id::TicketIdCounter;
