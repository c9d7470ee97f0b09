//! Error taxonomy for the RailSeat reservation workspace.
//!
//! Structured variants for the recoverable outcomes of purchase and inquiry,
//! plus construction-time validation. Refund deliberately does not use this
//! crate: it reports a bare boolean and never distinguishes sub-reasons.

use thiserror::Error;

/// Error from a purchase or inquiry request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveError {
    /// No seat on the route can cover the requested segment right now.
    ///
    /// Recoverable: the caller may retry, pick another segment, or another
    /// route. Concurrent refunds can make seats available again.
    #[error("no seat available on route {route} for segment [{departure}, {arrival})")]
    SoldOut {
        route: u32,
        departure: u32,
        arrival: u32,
    },

    /// Route number out of range for this system.
    #[error("unknown route {route} (system has {routes} routes)")]
    UnknownRoute { route: u32, routes: u32 },

    /// Station pair is not a valid travel segment.
    ///
    /// Requires `1 <= departure < arrival <= stations`.
    #[error("invalid segment [{departure}, {arrival}) on {stations} stations")]
    InvalidSegment {
        departure: u32,
        arrival: u32,
        stations: u32,
    },
}

/// Error from reservation-system construction.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A dimension (routes, coaches, seats per coach) was zero.
    #[error("{field} must be at least 1")]
    ZeroDimension { field: &'static str },

    /// Fewer than two stations: no travel segment exists.
    #[error("need at least 2 stations, got {stations}")]
    TooFewStations { stations: u32 },

    /// More segments than fit in one occupancy word.
    #[error("{stations} stations need {segments} segment bits, limit is {limit}")]
    TooManyStations {
        stations: u32,
        segments: u32,
        limit: u32,
    },

    /// `coaches * seats_per_coach` does not fit the seat index space.
    #[error("{coaches} coaches x {seats_per_coach} seats per coach overflows the seat index")]
    TooManySeats { coaches: u32, seats_per_coach: u32 },
}
