//! prenota: booking engine for a coworking-space marketplace.
//!
//! Event-sourced per-space state behind an append-only journal: weekly
//! availability with date exceptions, conflict-checked reservation holds,
//! a closed booking state machine, and cancellation-refund policies.

pub mod clock;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
