use ulid::Ulid;

use crate::model::*;

use super::EngineError;
use super::availability::saturated_spans;

pub(crate) fn validate_date(date: Date) -> Result<(), EngineError> {
    use crate::limits::*;
    if date.0 < MIN_VALID_DATE_DAYS || date.0 > MAX_VALID_DATE_DAYS {
        return Err(EngineError::LimitExceeded("date out of range"));
    }
    Ok(())
}

pub(crate) fn validate_slot(slot: Option<TimeRange>) -> Result<(), EngineError> {
    if let Some(r) = slot {
        if r.start >= r.end {
            return Err(EngineError::InvalidSlot("start must be before end"));
        }
        if r.end > MINUTES_PER_DAY {
            return Err(EngineError::InvalidSlot("end past midnight"));
        }
    }
    Ok(())
}

/// The conflict rule: a request conflicts when live claims saturate the
/// space's capacity somewhere over its span. With the default capacity of
/// one, the first crossing claim is the conflict. Expired holds are invisible
/// without waiting for the sweeper, and `exclude` lets guarded re-checks skip
/// the booking's own claim.
pub(crate) fn check_no_conflict(
    rs: &SpaceState,
    span: Span,
    now: Ms,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    if rs.capacity <= 1 {
        for claim in rs.overlapping(span) {
            if Some(claim.booking_id) == exclude {
                continue;
            }
            match claim.kind {
                ClaimKind::Hold { expires_at } if expires_at <= now => continue,
                ClaimKind::Hold { .. } | ClaimKind::Booked => {
                    return Err(EngineError::SlotTaken(claim.booking_id));
                }
            }
        }
    } else {
        let allocs = collect_active_claims(rs, span, now, exclude);
        let saturated = saturated_spans(&allocs, rs.capacity);
        for sat in &saturated {
            if sat.overlaps(&span) {
                return Err(EngineError::CapacityFull(rs.capacity));
            }
        }
    }
    Ok(())
}

/// Booking ids whose live claims cross the candidate span, in span-start
/// order. On the default exclusive space every returned id is a conflict; on
/// a capacity-n space these are the claims the saturation count runs over.
pub fn find_conflicts(rs: &SpaceState, span: Span, now: Ms) -> Vec<Ulid> {
    let mut ids = Vec::new();
    for claim in rs.overlapping(span) {
        match claim.kind {
            ClaimKind::Hold { expires_at } if expires_at <= now => continue,
            ClaimKind::Hold { .. } | ClaimKind::Booked => ids.push(claim.booking_id),
        }
    }
    ids
}

/// Live claim spans crossing the query window, sorted by start.
fn collect_active_claims(
    rs: &SpaceState,
    query: Span,
    now: Ms,
    exclude: Option<Ulid>,
) -> Vec<Span> {
    let mut allocs = Vec::new();
    for claim in rs.overlapping(query) {
        if Some(claim.booking_id) == exclude {
            continue;
        }
        match claim.kind {
            ClaimKind::Hold { expires_at } if expires_at <= now => continue,
            ClaimKind::Hold { .. } | ClaimKind::Booked => allocs.push(claim.span),
        }
    }
    allocs.sort_by_key(|s| s.start);
    allocs
}
