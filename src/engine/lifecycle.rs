//! The booking state machine: which event moves which status where. Pure
//! table, no clocks and no locks; the contextual guards (hold deadlines,
//! payment amounts, check-in windows) live with the engine mutations.

use ulid::Ulid;

use crate::model::*;

/// External happenings a booking reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingEvent {
    HostApproved,
    HostRejected { reason: Option<String> },
    PaymentCompleted { payment_id: Ulid, amount: Cents },
    CheckedIn,
    CheckedOut,
    Settled,
    HoldExpired,
}

impl BookingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::HostApproved => "host_approved",
            BookingEvent::HostRejected { .. } => "host_rejected",
            BookingEvent::PaymentCompleted { .. } => "payment_completed",
            BookingEvent::CheckedIn => "checked_in",
            BookingEvent::CheckedOut => "checked_out",
            BookingEvent::Settled => "settled",
            BookingEvent::HoldExpired => "hold_expired",
        }
    }
}

/// The transition table. `None` means the event is never legal from that
/// status, terminal statuses included.
pub fn next_status(from: BookingStatus, event: &BookingEvent) -> Option<BookingStatus> {
    use BookingStatus::*;
    match (from, event) {
        (PendingApproval, BookingEvent::HostApproved) => Some(PendingPayment),
        (PendingApproval, BookingEvent::HostRejected { .. }) => Some(Rejected),
        (PendingApproval, BookingEvent::HoldExpired) => Some(Rejected),
        (PendingPayment, BookingEvent::PaymentCompleted { .. }) => Some(Confirmed),
        (PendingPayment, BookingEvent::HoldExpired) => Some(Cancelled),
        (Confirmed, BookingEvent::CheckedIn) => Some(CheckedIn),
        (CheckedIn, BookingEvent::CheckedOut) => Some(CheckedOut),
        (CheckedOut, BookingEvent::Settled) => Some(Served),
        _ => None,
    }
}

/// Where a brand-new request starts.
pub fn initial_status(mode: ConfirmationMode) -> BookingStatus {
    match mode {
        ConfirmationMode::Instant => BookingStatus::PendingPayment,
        ConfirmationMode::HostApproval => BookingStatus::PendingApproval,
    }
}

/// Statuses a cancellation may leave from. Once checked in, the stay runs to
/// checkout.
pub fn cancellable(from: BookingStatus) -> bool {
    matches!(
        from,
        BookingStatus::PendingApproval | BookingStatus::PendingPayment | BookingStatus::Confirmed
    )
}

/// Which party a notice goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyParty {
    Coworker,
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Approved; the payment window is open.
    PaymentRequired,
    RequestRejected,
    BookingConfirmed,
    BookingCancelled,
    /// A pending hold lapsed before payment or approval.
    HoldExpired,
    /// Stay settled after checkout.
    BookingServed,
}

/// Side effects a state change asks the caller to run. The engine has already
/// journaled the change when these are handed back; executing them is the
/// integration layer's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Notify { party: NotifyParty, kind: NoticeKind },
    /// Return money on a captured payment.
    IssueRefund { payment_id: Ulid, amount: Cents },
    /// Release the host's share after a served stay.
    ReleasePayout { amount: Cents },
}

/// Outcome of a lifecycle transition: the updated record plus the outward
/// consequences.
#[derive(Debug, Clone)]
pub struct Transition {
    pub booking: BookingRecord,
    pub effects: Vec<Effect>,
}

/// Outcome of a cancellation.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub booking: BookingRecord,
    pub refund: RefundBreakdown,
    pub effects: Vec<Effect>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    #[test]
    fn approval_path_reaches_served() {
        let mut status = initial_status(ConfirmationMode::HostApproval);
        assert_eq!(status, PendingApproval);
        for event in [
            BookingEvent::HostApproved,
            BookingEvent::PaymentCompleted { payment_id: Ulid::new(), amount: 100 },
            BookingEvent::CheckedIn,
            BookingEvent::CheckedOut,
            BookingEvent::Settled,
        ] {
            status = next_status(status, &event).unwrap();
        }
        assert_eq!(status, Served);
        assert!(status.is_terminal());
    }

    #[test]
    fn check_in_requires_confirmed_first() {
        let paid = BookingEvent::PaymentCompleted { payment_id: Ulid::new(), amount: 100 };
        assert_eq!(next_status(PendingPayment, &BookingEvent::CheckedIn), None);
        assert_eq!(next_status(PendingApproval, &BookingEvent::CheckedIn), None);
        assert_eq!(next_status(PendingApproval, &paid), None);
        assert_eq!(next_status(Confirmed, &BookingEvent::CheckedOut), None);
        assert_eq!(next_status(Confirmed, &BookingEvent::Settled), None);
    }

    #[test]
    fn terminal_statuses_accept_nothing() {
        let events = [
            BookingEvent::HostApproved,
            BookingEvent::HostRejected { reason: None },
            BookingEvent::PaymentCompleted { payment_id: Ulid::new(), amount: 1 },
            BookingEvent::CheckedIn,
            BookingEvent::CheckedOut,
            BookingEvent::Settled,
            BookingEvent::HoldExpired,
        ];
        for terminal in [Cancelled, Rejected, Served] {
            for event in &events {
                assert_eq!(next_status(terminal, event), None);
            }
        }
    }

    #[test]
    fn hold_expiry_direction_depends_on_stage() {
        assert_eq!(next_status(PendingApproval, &BookingEvent::HoldExpired), Some(Rejected));
        assert_eq!(next_status(PendingPayment, &BookingEvent::HoldExpired), Some(Cancelled));
        assert_eq!(next_status(Confirmed, &BookingEvent::HoldExpired), None);
    }

    #[test]
    fn instant_mode_skips_approval() {
        assert_eq!(initial_status(ConfirmationMode::Instant), PendingPayment);
        assert_eq!(next_status(PendingPayment, &BookingEvent::HostApproved), None);
    }

    #[test]
    fn cancellable_stops_at_check_in() {
        assert!(cancellable(PendingApproval));
        assert!(cancellable(PendingPayment));
        assert!(cancellable(Confirmed));
        assert!(!cancellable(CheckedIn));
        assert!(!cancellable(CheckedOut));
        assert!(!cancellable(Served));
        assert!(!cancellable(Cancelled));
    }
}
