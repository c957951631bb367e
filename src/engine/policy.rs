//! Cancellation policy math. Tiers map to a refund ladder: the first rung
//! whose minimum lead time is met decides the penalty percentage, and missing
//! every rung forfeits the full amount.

use crate::model::*;

/// Ladder per tier as (minimum lead hours, penalty percent) rungs, best rung
/// first. Kept as data so new tiers are a table edit, not new branches.
const fn ladder(tier: PolicyTier) -> &'static [(i64, u8)] {
    match tier {
        PolicyTier::Flexible => &[(24, 0)],
        PolicyTier::Moderate => &[(120, 0)],
        PolicyTier::Strict => &[(336, 0)],
    }
}

/// Penalty percentage for cancelling `lead_ms` before the booked start.
/// Negative lead (the booking already started) never matches a rung.
pub fn penalty_percentage(tier: PolicyTier, lead_ms: Ms) -> u8 {
    for &(min_hours, pct) in ladder(tier) {
        if lead_ms >= min_hours * MS_PER_HOUR {
            return pct;
        }
    }
    100
}

/// Split a gross amount into penalty and refund, penalty rounded half-up to
/// the cent. The halves always add back to the gross.
pub fn split_refund(gross: Cents, penalty_pct: u8) -> RefundBreakdown {
    let penalty = (gross * penalty_pct as Cents + 50) / 100;
    RefundBreakdown { gross, penalty_pct, penalty, refund: gross - penalty }
}

/// Policy snapshot for a new booking: request override, then the space
/// default, then moderate.
pub fn resolve_policy(request: Option<PolicyTier>, space: Option<PolicyTier>) -> PolicyTier {
    request.or(space).unwrap_or_default()
}

/// Price implied by the space's posted rates, when they cover the request.
/// Fractional hours bill pro rata, rounded half-up to the cent.
pub fn posted_price(rs: &SpaceState, slot: Option<TimeRange>) -> Option<Cents> {
    match slot {
        Some(r) => {
            let per_hour = rs.price_per_hour?;
            Some((per_hour * r.duration_minutes() as Cents + 30) / 60)
        }
        None => rs.price_per_day.or_else(|| rs.price_per_hour.map(|h| h * 24)),
    }
}

/// Gross amount a cancellation settles against, best source first: the
/// completed payment, the agreed price, the posted rates, then zero.
pub fn resolve_gross(rs: &SpaceState, booking: &BookingRecord) -> Cents {
    if let Some(p) = booking.completed_payment() {
        return p.amount;
    }
    if let Some(price) = booking.price {
        return price;
    }
    posted_price(rs, booking.slot).unwrap_or(0)
}

/// Refund mathematics for cancelling now. Hosts and lapsed-hold sweeps always
/// refund in full; a coworker's own cancellation goes through the booking's
/// policy snapshot.
pub fn compute_cancellation(
    rs: &SpaceState,
    booking: &BookingRecord,
    by: CancelParty,
    now: Ms,
) -> RefundBreakdown {
    let gross = resolve_gross(rs, booking);
    let pct = match by {
        CancelParty::Host | CancelParty::System => 0,
        CancelParty::Coworker => penalty_percentage(booking.policy, booking.span().start - now),
    };
    split_refund(gross, pct)
}
