//! Hard limits on engine state. Every inbound mutation is validated against
//! these before anything is journaled.

use crate::model::{Cents, Ms, MS_PER_HOUR};

/// Maximum number of spaces a single engine instance will track.
pub const MAX_SPACES: usize = 100_000;

/// Maximum length of a space name, in bytes.
pub const MAX_NAME_LEN: usize = 256;

/// Maximum length of a rejection or cancellation reason, in bytes.
pub const MAX_REASON_LEN: usize = 1_024;

/// Maximum bookings retained per space, terminal ones included.
pub const MAX_BOOKINGS_PER_SPACE: usize = 100_000;

/// Maximum open slots per weekday rule or date exception.
pub const MAX_SLOTS_PER_DAY: usize = 48;

/// Maximum date exceptions a schedule may carry.
pub const MAX_EXCEPTIONS_PER_SCHEDULE: usize = 1_000;

/// Maximum concurrent-booking capacity a space may declare.
pub const MAX_CAPACITY: u32 = 1_000;

/// Earliest date the engine accepts, in days since the Unix epoch (1970-01-01).
pub const MIN_VALID_DATE_DAYS: i64 = 0;

/// Latest date the engine accepts, in days since the Unix epoch (2100-01-01).
pub const MAX_VALID_DATE_DAYS: i64 = 47_482;

/// Largest monetary amount accepted, in cents. Keeps percentage math far from
/// i64 overflow.
pub const MAX_PRICE_CENTS: Cents = 100_000_000;

/// Widest date range one availability query may scan, in days.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 92;

/// Hold TTL for instant-confirmation requests: the payment round trip.
pub const DEFAULT_HOLD_TTL_MS: Ms = 2 * MS_PER_HOUR;

/// Hold TTL while a request waits for host approval.
pub const DEFAULT_APPROVAL_TTL_MS: Ms = 24 * MS_PER_HOUR;

/// Payment window granted once a host approves a request.
pub const PAYMENT_TTL_MS: Ms = 2 * MS_PER_HOUR;

/// Extended payment window when the coworker asked for an invoice.
pub const PAYMENT_TTL_INVOICE_MS: Ms = 72 * MS_PER_HOUR;

/// Upper bound on any caller-supplied hold TTL.
pub const MAX_HOLD_TTL_MS: Ms = 7 * 24 * MS_PER_HOUR;

/// How early before the booked start a check-in is accepted.
pub const CHECKIN_EARLY_MS: Ms = 2 * MS_PER_HOUR;
