//! Core domain types: calendar dates, wall-clock slots, absolute spans, the
//! per-space state the engine guards, and the journal event set.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only instant type the engine speaks.
pub type Ms = i64;

/// Monetary amounts, in euro cents.
pub type Cents = i64;

/// Wall-clock minutes since midnight.
pub type Minutes = u16;

pub const MS_PER_MINUTE: Ms = 60_000;
pub const MS_PER_HOUR: Ms = 3_600_000;
pub const MS_PER_DAY: Ms = 86_400_000;
pub const MINUTES_PER_DAY: Minutes = 1_440;

// ─── Calendar dates ─────────────────────────────────────────────────────────

/// A civil calendar date, stored as days since the Unix epoch. Dates are
/// timezone-naive: a space's schedule and its bookings share one wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Date(pub i64);

impl Date {
    /// Days-from-civil (proleptic Gregorian). Inputs are not range-checked;
    /// use [`Date::parse`] for untrusted data.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Self {
        let y = if month <= 2 { year as i64 - 1 } else { year as i64 };
        let era = if y >= 0 { y } else { y - 399 } / 400;
        let yoe = y - era * 400;
        let mp = (month as i64 + 9) % 12;
        let doy = (153 * mp + 2) / 5 + day as i64 - 1;
        let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
        Date(era * 146_097 + doe - 719_468)
    }

    /// Civil-from-days: the (year, month, day) triple of this date.
    pub fn ymd(&self) -> (i32, u32, u32) {
        let z = self.0 + 719_468;
        let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
        let doe = z - era * 146_097;
        let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
        let y = yoe + era * 400;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let d = doy - (153 * mp + 2) / 5 + 1;
        let m = if mp < 10 { mp + 3 } else { mp - 9 };
        ((if m <= 2 { y + 1 } else { y }) as i32, m as u32, d as u32)
    }

    /// Parse `YYYY-MM-DD`. Rejects out-of-range components and days that do
    /// not exist (2025-02-30).
    pub fn parse(s: &str) -> Option<Date> {
        let mut it = s.split('-');
        let y: i32 = it.next()?.parse().ok()?;
        let m: u32 = it.next()?.parse().ok()?;
        let d: u32 = it.next()?.parse().ok()?;
        if it.next().is_some() || !(1..=12).contains(&m) || !(1..=31).contains(&d) {
            return None;
        }
        let date = Date::from_ymd(y, m, d);
        if date.ymd() == (y, m, d) { Some(date) } else { None }
    }

    /// Weekday index, 0 = Monday through 6 = Sunday.
    pub fn weekday(&self) -> usize {
        ((self.0.rem_euclid(7)) + 3) as usize % 7
    }

    pub fn next(&self) -> Date {
        Date(self.0 + 1)
    }

    /// Midnight of this date as an absolute instant.
    pub fn to_ms(&self) -> Ms {
        self.0 * MS_PER_DAY
    }
}

impl std::fmt::Display for Date {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (y, m, d) = self.ymd();
        write!(f, "{y:04}-{m:02}-{d:02}")
    }
}

// ─── Wall-clock ranges and absolute spans ───────────────────────────────────

/// Half-open wall-clock range `[start, end)` in minutes since midnight.
/// `end` may be 1440 for ranges running to midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Minutes,
    pub end: Minutes,
}

impl TimeRange {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> Minutes {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when `other` lies fully inside `self`. Shared endpoints count as
    /// inside.
    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Parse `HH:MM` into minutes since midnight. `24:00` is accepted as 1440.
pub fn parse_hhmm(s: &str) -> Option<Minutes> {
    let (h, m) = s.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let h: u16 = h.parse().ok()?;
    let m: u16 = m.parse().ok()?;
    let t = h * 60 + m;
    if m > 59 || t > MINUTES_PER_DAY {
        return None;
    }
    Some(t)
}

/// Format minutes since midnight as `HH:MM`.
pub fn format_hhmm(t: Minutes) -> String {
    format!("{:02}:{:02}", t / 60, t % 60)
}

/// Half-open absolute interval `[start, end)` in unix ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Absolute span a booking occupies. A timed booking claims its slot on the
/// date; a whole-day booking claims the full civil day and therefore crosses
/// every timed slot on it.
pub fn slot_span(date: Date, slot: Option<TimeRange>) -> Span {
    match slot {
        Some(r) => Span::new(
            date.to_ms() + r.start as Ms * MS_PER_MINUTE,
            date.to_ms() + r.end as Ms * MS_PER_MINUTE,
        ),
        None => Span::new(date.to_ms(), date.next().to_ms()),
    }
}

// ─── Closed enums ───────────────────────────────────────────────────────────

/// How a space confirms incoming requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationMode {
    /// Pay right away, no host involvement.
    Instant,
    /// Host must approve before the payment window opens.
    HostApproval,
}

/// Cancellation policy tier. Each tier maps to one full-refund lead-time
/// threshold in `engine::policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyTier {
    Flexible,
    #[default]
    Moderate,
    Strict,
}

impl PolicyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyTier::Flexible => "flexible",
            PolicyTier::Moderate => "moderate",
            PolicyTier::Strict => "strict",
        }
    }
}

/// Booking lifecycle status. Closed set; the legal moves live in
/// `engine::lifecycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    PendingApproval,
    Confirmed,
    CheckedIn,
    CheckedOut,
    Served,
    Cancelled,
    Rejected,
}

impl BookingStatus {
    /// Terminal statuses admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Rejected | BookingStatus::Served
        )
    }

    /// Whether a booking in this status still claims its slot.
    pub fn holds_slot(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled | BookingStatus::Rejected)
    }

    /// Statuses backed by a reservation hold with a deadline.
    pub fn is_pending(&self) -> bool {
        matches!(self, BookingStatus::PendingPayment | BookingStatus::PendingApproval)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "pending_payment",
            BookingStatus::PendingApproval => "pending_approval",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::CheckedIn => "checked_in",
            BookingStatus::CheckedOut => "checked_out",
            BookingStatus::Served => "served",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelParty {
    Coworker,
    Host,
    /// Lapsed-hold sweeps.
    System,
}

impl CancelParty {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelParty::Coworker => "coworker",
            CancelParty::Host => "host",
            CancelParty::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Refunded,
}

// ─── Slot claims ────────────────────────────────────────────────────────────

/// What an entry in the slot index stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimKind {
    /// Temporary reservation awaiting payment or approval. Expired holds are
    /// invisible to conflict checks and reaped by the sweeper.
    Hold { expires_at: Ms },
    /// Paid booking.
    Booked,
}

/// One entry in a space's slot index. Every booking in a slot-holding status
/// owns exactly one claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotClaim {
    pub booking_id: Ulid,
    pub span: Span,
    pub kind: ClaimKind,
}

// ─── Weekly schedules ───────────────────────────────────────────────────────

/// Recurring rule for one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRule {
    pub enabled: bool,
    /// Sorted, non-overlapping open slots.
    pub slots: Vec<TimeRange>,
}

impl DayRule {
    pub fn closed() -> Self {
        Self { enabled: false, slots: Vec::new() }
    }

    pub fn open(slots: Vec<TimeRange>) -> Self {
        Self { enabled: true, slots }
    }
}

/// Date-specific override. When present it replaces the weekday rule for that
/// date entirely, `enabled = false` closures included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateException {
    pub date: Date,
    pub enabled: bool,
    #[serde(default)]
    pub slots: Vec<TimeRange>,
}

/// A space's availability: one recurring rule per weekday (index 0 = Monday)
/// plus date exceptions sorted by date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub days: [DayRule; 7],
    #[serde(default)]
    pub exceptions: Vec<DateException>,
}

impl WeeklySchedule {
    /// Schedule with every day closed. New spaces start here.
    pub fn closed() -> Self {
        Self { days: std::array::from_fn(|_| DayRule::closed()), exceptions: Vec::new() }
    }

    /// Effective rule for a date. The exception wins when one exists.
    pub fn rule_for(&self, date: Date) -> (bool, &[TimeRange]) {
        if let Ok(i) = self.exceptions.binary_search_by_key(&date, |e| e.date) {
            let e = &self.exceptions[i];
            return (e.enabled, &e.slots);
        }
        let rule = &self.days[date.weekday()];
        (rule.enabled, &rule.slots)
    }
}

// ─── Bookings ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Ulid,
    pub amount: Cents,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRecord {
    pub by: CancelParty,
    pub reason: Option<String>,
    pub at: Ms,
    pub refund: Cents,
    pub penalty: Cents,
}

/// A booking as the engine tracks it. Records are never deleted; terminal
/// statuses stay queryable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: Ulid,
    pub space_id: Ulid,
    pub coworker_id: Ulid,
    pub date: Date,
    /// None books the whole day.
    pub slot: Option<TimeRange>,
    pub status: BookingStatus,
    /// Policy snapshot taken at creation. Later space edits do not apply.
    pub policy: PolicyTier,
    /// Agreed gross price, when derivable at creation.
    pub price: Option<Cents>,
    /// Hold deadline while the status is pending payment or approval.
    pub reserved_until: Option<Ms>,
    pub invoice_requested: bool,
    /// Host's stated reason when the request was rejected.
    pub rejection_reason: Option<String>,
    pub payments: Vec<PaymentRecord>,
    pub cancellation: Option<CancellationRecord>,
    /// Bumped on every applied event. Callers may hand it back for optimistic
    /// concurrency.
    pub version: u64,
}

impl BookingRecord {
    /// The absolute interval this booking occupies.
    pub fn span(&self) -> Span {
        slot_span(self.date, self.slot)
    }

    pub fn completed_payment(&self) -> Option<&PaymentRecord> {
        self.payments.iter().find(|p| p.status == PaymentStatus::Completed)
    }
}

// ─── Spaces ─────────────────────────────────────────────────────────────────

/// Registration payload for a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceConfig {
    pub host_id: Ulid,
    pub name: Option<String>,
    pub confirmation: ConfirmationMode,
    /// Space default policy. None falls back to moderate.
    pub policy: Option<PolicyTier>,
    /// Max concurrent bookings over any instant. 1 for desks and private
    /// rooms; open floors may go higher.
    pub capacity: u32,
    pub price_per_hour: Option<Cents>,
    pub price_per_day: Option<Cents>,
}

/// Per-space engine state. One `RwLock` guards the whole struct, so a
/// conflict check and the claim it admits are atomic per space.
#[derive(Debug, Clone)]
pub struct SpaceState {
    pub id: Ulid,
    pub host_id: Ulid,
    pub name: Option<String>,
    pub confirmation: ConfirmationMode,
    pub policy: Option<PolicyTier>,
    pub capacity: u32,
    pub price_per_hour: Option<Cents>,
    pub price_per_day: Option<Cents>,
    pub schedule: WeeklySchedule,
    /// Live slot claims, sorted by `span.start`.
    pub claims: Vec<SlotClaim>,
    /// Every booking taken on this space, keyed by id.
    pub bookings: HashMap<Ulid, BookingRecord>,
}

impl SpaceState {
    pub fn new(id: Ulid, config: SpaceConfig) -> Self {
        Self {
            id,
            host_id: config.host_id,
            name: config.name,
            confirmation: config.confirmation,
            policy: config.policy,
            capacity: config.capacity,
            price_per_hour: config.price_per_hour,
            price_per_day: config.price_per_day,
            schedule: WeeklySchedule::closed(),
            claims: Vec::new(),
            bookings: HashMap::new(),
        }
    }

    pub fn apply_config(&mut self, config: SpaceConfig) {
        self.host_id = config.host_id;
        self.name = config.name;
        self.confirmation = config.confirmation;
        self.policy = config.policy;
        self.capacity = config.capacity;
        self.price_per_hour = config.price_per_hour;
        self.price_per_day = config.price_per_day;
    }

    /// Registration fields as a config payload, the inverse of
    /// [`SpaceState::apply_config`].
    pub fn config(&self) -> SpaceConfig {
        SpaceConfig {
            host_id: self.host_id,
            name: self.name.clone(),
            confirmation: self.confirmation,
            policy: self.policy,
            capacity: self.capacity,
            price_per_hour: self.price_per_hour,
            price_per_day: self.price_per_day,
        }
    }

    /// Insert a claim keeping the index sorted by span start.
    pub fn insert_claim(&mut self, claim: SlotClaim) {
        let pos = self
            .claims
            .binary_search_by_key(&claim.span.start, |c| c.span.start)
            .unwrap_or_else(|e| e);
        self.claims.insert(pos, claim);
    }

    /// Remove the claim owned by a booking, if any.
    pub fn remove_claim(&mut self, booking_id: Ulid) -> Option<SlotClaim> {
        let pos = self.claims.iter().position(|c| c.booking_id == booking_id)?;
        Some(self.claims.remove(pos))
    }

    pub fn claim_mut(&mut self, booking_id: Ulid) -> Option<&mut SlotClaim> {
        self.claims.iter_mut().find(|c| c.booking_id == booking_id)
    }

    /// Claims overlapping the query span. Binary search on the sorted starts
    /// bounds the scan to `[.., first start >= query.end)`.
    pub fn overlapping(&self, query: Span) -> impl Iterator<Item = &SlotClaim> {
        let right = self.claims.partition_point(|c| c.span.start < query.end);
        self.claims[..right].iter().filter(move |c| c.span.end > query.start)
    }
}

/// Owned view of a space returned by queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceInfo {
    pub id: Ulid,
    pub host_id: Ulid,
    pub name: Option<String>,
    pub confirmation: ConfirmationMode,
    pub policy: Option<PolicyTier>,
    pub capacity: u32,
    pub price_per_hour: Option<Cents>,
    pub price_per_day: Option<Cents>,
}

impl SpaceInfo {
    pub fn of(rs: &SpaceState) -> Self {
        Self {
            id: rs.id,
            host_id: rs.host_id,
            name: rs.name.clone(),
            confirmation: rs.confirmation,
            policy: rs.policy,
            capacity: rs.capacity,
            price_per_hour: rs.price_per_hour,
            price_per_day: rs.price_per_day,
        }
    }
}

// ─── Requests and results ───────────────────────────────────────────────────

/// Reservation request passed to `Engine::create_reservation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub space_id: Ulid,
    pub coworker_id: Ulid,
    pub date: Date,
    /// None books the whole day.
    pub slot: Option<TimeRange>,
    /// Overrides the space's policy snapshot for this booking.
    pub policy_override: Option<PolicyTier>,
    pub invoice_requested: bool,
    /// Hold TTL override. Defaults per confirmation mode.
    pub ttl_ms: Option<Ms>,
}

/// Outcome of a refund computation. `penalty + refund == gross`, always.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundBreakdown {
    pub gross: Cents,
    pub penalty_pct: u8,
    pub penalty: Cents,
    pub refund: Cents,
}

// ─── Journal events ─────────────────────────────────────────────────────────

/// Journal record format. Every state change is one of these, appended before
/// it is applied in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SpaceRegistered {
        id: Ulid,
        config: SpaceConfig,
    },
    SpaceUpdated {
        id: Ulid,
        config: SpaceConfig,
    },
    SpaceRemoved {
        id: Ulid,
    },
    ScheduleReplaced {
        space_id: Ulid,
        schedule: WeeklySchedule,
    },
    BookingRequested {
        id: Ulid,
        space_id: Ulid,
        coworker_id: Ulid,
        date: Date,
        slot: Option<TimeRange>,
        status: BookingStatus,
        policy: PolicyTier,
        price: Option<Cents>,
        reserved_until: Ms,
        invoice_requested: bool,
    },
    BookingTransitioned {
        id: Ulid,
        space_id: Ulid,
        to: BookingStatus,
        at: Ms,
        /// New hold deadline when `to` is still a pending status.
        reserved_until: Option<Ms>,
        /// Host's reason when `to` is rejected.
        reason: Option<String>,
    },
    BookingCancelled {
        id: Ulid,
        space_id: Ulid,
        by: CancelParty,
        reason: Option<String>,
        refund: Cents,
        penalty: Cents,
        at: Ms,
    },
    PaymentRecorded {
        booking_id: Ulid,
        space_id: Ulid,
        payment_id: Ulid,
        amount: Cents,
        status: PaymentStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_epoch_round_trip() {
        let d = Date::from_ymd(1970, 1, 1);
        assert_eq!(d.0, 0);
        assert_eq!(d.ymd(), (1970, 1, 1));
        assert_eq!(d.weekday(), 3); // Thursday
    }

    #[test]
    fn date_known_weekdays() {
        assert_eq!(Date::from_ymd(2025, 3, 3).weekday(), 0); // Monday
        assert_eq!(Date::from_ymd(2025, 3, 9).weekday(), 6); // Sunday
        assert_eq!(Date::from_ymd(2024, 2, 29).weekday(), 3); // leap Thursday
    }

    #[test]
    fn date_leap_year_round_trip() {
        let d = Date::from_ymd(2024, 2, 29);
        assert_eq!(d.ymd(), (2024, 2, 29));
        assert_eq!(d.next().ymd(), (2024, 3, 1));
    }

    #[test]
    fn date_display_is_iso() {
        assert_eq!(Date::from_ymd(2025, 3, 8).to_string(), "2025-03-08");
    }

    #[test]
    fn date_parse_accepts_iso() {
        assert_eq!(Date::parse("2025-03-08"), Some(Date::from_ymd(2025, 3, 8)));
        assert_eq!(Date::parse("2024-02-29"), Some(Date::from_ymd(2024, 2, 29)));
    }

    #[test]
    fn date_parse_rejects_nonexistent_days() {
        assert_eq!(Date::parse("2025-02-30"), None);
        assert_eq!(Date::parse("2025-13-01"), None);
        assert_eq!(Date::parse("2025-00-10"), None);
        assert_eq!(Date::parse("not-a-date"), None);
        assert_eq!(Date::parse("2025-03-08-extra"), None);
    }

    #[test]
    fn parse_hhmm_bounds() {
        assert_eq!(parse_hhmm("09:00"), Some(540));
        assert_eq!(parse_hhmm("23:59"), Some(1_439));
        assert_eq!(parse_hhmm("24:00"), Some(1_440));
        assert_eq!(parse_hhmm("24:01"), None);
        assert_eq!(parse_hhmm("09:60"), None);
        assert_eq!(parse_hhmm("9:00"), None);
        assert_eq!(parse_hhmm("0900"), None);
    }

    #[test]
    fn format_hhmm_pads() {
        assert_eq!(format_hhmm(540), "09:00");
        assert_eq!(format_hhmm(1_440), "24:00");
        assert_eq!(format_hhmm(5), "00:05");
    }

    #[test]
    fn time_range_overlap_is_half_open() {
        let morning = TimeRange::new(540, 720);
        let touching = TimeRange::new(720, 840);
        let crossing = TimeRange::new(660, 840);
        assert!(!morning.overlaps(&touching));
        assert!(morning.overlaps(&crossing));
    }

    #[test]
    fn time_range_containment_includes_endpoints() {
        let open = TimeRange::new(540, 1_080);
        assert!(open.contains(&TimeRange::new(540, 1_080)));
        assert!(open.contains(&TimeRange::new(600, 660)));
        assert!(!open.contains(&TimeRange::new(480, 600)));
    }

    #[test]
    fn span_overlap_is_half_open() {
        let a = Span::new(0, 100);
        let b = Span::new(100, 200);
        let c = Span::new(99, 150);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn whole_day_span_crosses_every_slot_on_the_date() {
        let date = Date::from_ymd(2025, 6, 2);
        let day = slot_span(date, None);
        let slot = slot_span(date, Some(TimeRange::new(540, 720)));
        let next_day_slot = slot_span(date.next(), Some(TimeRange::new(540, 720)));
        assert!(day.overlaps(&slot));
        assert!(!day.overlaps(&next_day_slot));
        assert_eq!(day.duration_ms(), MS_PER_DAY);
    }

    #[test]
    fn claims_stay_sorted_and_window_queries_hold() {
        let config = SpaceConfig {
            host_id: Ulid::new(),
            name: Some("desk".into()),
            confirmation: ConfirmationMode::Instant,
            policy: None,
            capacity: 1,
            price_per_hour: Some(1_500),
            price_per_day: None,
        };
        let mut rs = SpaceState::new(Ulid::new(), config);
        let ids: Vec<Ulid> = (0..4).map(|_| Ulid::new()).collect();
        for (i, span) in [(0, 300), (600, 900), (100, 200), (900, 1_000)].iter().enumerate() {
            rs.insert_claim(SlotClaim {
                booking_id: ids[i],
                span: Span::new(span.0, span.1),
                kind: ClaimKind::Booked,
            });
        }
        let starts: Vec<Ms> = rs.claims.iter().map(|c| c.span.start).collect();
        assert_eq!(starts, vec![0, 100, 600, 900]);

        let hits: Vec<Ulid> =
            rs.overlapping(Span::new(150, 700)).map(|c| c.booking_id).collect();
        assert_eq!(hits, vec![ids[0], ids[2], ids[1]]);

        assert!(rs.remove_claim(ids[2]).is_some());
        assert!(rs.remove_claim(ids[2]).is_none());
        assert_eq!(rs.claims.len(), 3);
    }

    #[test]
    fn exception_replaces_weekday_rule() {
        let mut schedule = WeeklySchedule::closed();
        schedule.days[0] = DayRule::open(vec![TimeRange::new(540, 1_080)]);
        let monday = Date::from_ymd(2025, 3, 3);
        schedule.exceptions.push(DateException { date: monday, enabled: false, slots: vec![] });

        let (open, _) = schedule.rule_for(monday);
        assert!(!open);
        let (open, slots) = schedule.rule_for(Date::from_ymd(2025, 3, 10));
        assert!(open);
        assert_eq!(slots, &[TimeRange::new(540, 1_080)]);
    }

    #[test]
    fn terminal_statuses_drop_their_claims() {
        for status in [BookingStatus::Cancelled, BookingStatus::Rejected] {
            assert!(status.is_terminal());
            assert!(!status.holds_slot());
        }
        assert!(BookingStatus::Served.is_terminal());
        assert!(BookingStatus::Served.holds_slot());
        assert!(BookingStatus::PendingApproval.is_pending());
        assert!(!BookingStatus::Confirmed.is_pending());
    }

    #[test]
    fn events_round_trip_through_bincode() {
        let event = Event::BookingRequested {
            id: Ulid::new(),
            space_id: Ulid::new(),
            coworker_id: Ulid::new(),
            date: Date::from_ymd(2025, 7, 1),
            slot: Some(TimeRange::new(540, 720)),
            status: BookingStatus::PendingApproval,
            policy: PolicyTier::Strict,
            price: Some(4_500),
            reserved_until: 1_000_000,
            invoice_requested: true,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let back: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, event);
    }
}
