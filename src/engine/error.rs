use ulid::Ulid;

use crate::model::BookingStatus;

/// Broad failure class, for callers that branch on retryability rather than
/// the exact variant. Conflicts are retryable races; preconditions are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    Precondition,
    Validation,
    NotFound,
    Internal,
}

#[derive(Debug)]
pub enum EngineError {
    SpaceNotFound(Ulid),
    BookingNotFound(Ulid),
    AlreadyExists(Ulid),
    /// The requested span crosses a live claim held by this booking.
    SlotTaken(Ulid),
    /// Every one of the space's concurrent seats is claimed over the span.
    CapacityFull(u32),
    /// Optimistic concurrency check failed: the booking moved underneath the
    /// caller.
    StaleVersion { expected: u64, actual: u64 },
    /// The reservation hold lapsed before the guarded transition ran.
    HoldLapsed(Ulid),
    /// An expiry was requested for a hold whose deadline has not passed.
    HoldStillLive(Ulid),
    /// The event is never legal from this status.
    IllegalTransition { from: BookingStatus, event: &'static str },
    AlreadyTerminal(BookingStatus),
    PaymentMismatch { expected: i64, got: i64 },
    /// Check-in attempted outside the admission window.
    OutsideCheckInWindow { start: i64, end: i64 },
    /// Hosts cannot book their own spaces.
    SelfBooking,
    /// The date is outside opening hours or the slot is not contained in one
    /// open window.
    NotOpen,
    HasLiveBookings(Ulid),
    InvalidSchedule(&'static str),
    InvalidSlot(&'static str),
    LimitExceeded(&'static str),
    JournalError(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::SlotTaken(_)
            | EngineError::CapacityFull(_)
            | EngineError::StaleVersion { .. }
            | EngineError::HoldLapsed(_)
            | EngineError::AlreadyExists(_) => ErrorKind::Conflict,
            EngineError::IllegalTransition { .. }
            | EngineError::AlreadyTerminal(_)
            | EngineError::HoldStillLive(_)
            | EngineError::PaymentMismatch { .. }
            | EngineError::OutsideCheckInWindow { .. }
            | EngineError::SelfBooking
            | EngineError::HasLiveBookings(_) => ErrorKind::Precondition,
            EngineError::NotOpen
            | EngineError::InvalidSchedule(_)
            | EngineError::InvalidSlot(_)
            | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::SpaceNotFound(_) | EngineError::BookingNotFound(_) => ErrorKind::NotFound,
            EngineError::JournalError(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code, independent of the Display text.
    pub fn reason_code(&self) -> &'static str {
        match self {
            EngineError::SpaceNotFound(_) => "space_not_found",
            EngineError::BookingNotFound(_) => "booking_not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::SlotTaken(_) => "slot_taken",
            EngineError::CapacityFull(_) => "capacity_full",
            EngineError::StaleVersion { .. } => "stale_version",
            EngineError::HoldLapsed(_) => "hold_lapsed",
            EngineError::HoldStillLive(_) => "hold_still_live",
            EngineError::IllegalTransition { .. } => "illegal_transition",
            EngineError::AlreadyTerminal(_) => "already_terminal",
            EngineError::PaymentMismatch { .. } => "payment_mismatch",
            EngineError::OutsideCheckInWindow { .. } => "outside_checkin_window",
            EngineError::SelfBooking => "self_booking",
            EngineError::NotOpen => "not_open",
            EngineError::HasLiveBookings(_) => "has_live_bookings",
            EngineError::InvalidSchedule(_) => "invalid_schedule",
            EngineError::InvalidSlot(_) => "invalid_slot",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::JournalError(_) => "journal_error",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::SpaceNotFound(id) => write!(f, "space not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::SlotTaken(id) => write!(f, "slot taken by booking: {id}"),
            EngineError::CapacityFull(cap) => {
                write!(f, "capacity {cap} exhausted: all seats claimed")
            }
            EngineError::StaleVersion { expected, actual } => {
                write!(f, "stale version: expected {expected}, booking is at {actual}")
            }
            EngineError::HoldLapsed(id) => write!(f, "reservation hold lapsed: {id}"),
            EngineError::HoldStillLive(id) => {
                write!(f, "hold has not lapsed yet: {id}")
            }
            EngineError::IllegalTransition { from, event } => {
                write!(f, "event {event} is not legal from status {from}")
            }
            EngineError::AlreadyTerminal(status) => {
                write!(f, "booking is terminal: {status}")
            }
            EngineError::PaymentMismatch { expected, got } => {
                write!(f, "payment amount mismatch: expected {expected} cents, got {got}")
            }
            EngineError::OutsideCheckInWindow { start, end } => {
                write!(f, "check-in only accepted within [{start}, {end}]")
            }
            EngineError::SelfBooking => write!(f, "hosts cannot book their own space"),
            EngineError::NotOpen => write!(f, "space is not open over the requested slot"),
            EngineError::HasLiveBookings(id) => {
                write!(f, "cannot remove space {id}: live bookings remain")
            }
            EngineError::InvalidSchedule(msg) => write!(f, "invalid schedule: {msg}"),
            EngineError::InvalidSlot(msg) => write!(f, "invalid slot: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
