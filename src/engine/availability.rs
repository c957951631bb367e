use serde::Deserialize;

use crate::engine::error::EngineError;
use crate::limits::{MAX_EXCEPTIONS_PER_SCHEDULE, MAX_SLOTS_PER_DAY, MAX_VALID_DATE_DAYS, MIN_VALID_DATE_DAYS};
use crate::model::*;

// ── Opening hours ─────────────────────────────────────────────────

/// Whether a request falls inside opening hours. A timed request must fit
/// fully inside a single open slot; spanning two open slots across a gap does
/// not count. A whole-day request needs the date open with at least one slot.
pub fn is_open(schedule: &WeeklySchedule, date: Date, slot: Option<TimeRange>) -> bool {
    let (enabled, slots) = schedule.rule_for(date);
    if !enabled || slots.is_empty() {
        return false;
    }
    match slot {
        Some(r) => slots.iter().any(|open| open.contains(&r)),
        None => true,
    }
}

/// Effective open windows on a date, as absolute spans.
pub fn open_spans(schedule: &WeeklySchedule, date: Date) -> Vec<Span> {
    let (enabled, slots) = schedule.rule_for(date);
    if !enabled {
        return Vec::new();
    }
    slots.iter().map(|r| slot_span(date, Some(*r))).collect()
}

/// Sort a schedule's slots and exceptions in place, then check limits,
/// overlap, and date sanity. Every schedule entering the engine passes
/// through here.
pub fn validate_schedule(schedule: &mut WeeklySchedule) -> Result<(), EngineError> {
    for rule in schedule.days.iter_mut() {
        validate_slots(&mut rule.slots)?;
    }
    if schedule.exceptions.len() > MAX_EXCEPTIONS_PER_SCHEDULE {
        return Err(EngineError::LimitExceeded("too many schedule exceptions"));
    }
    schedule.exceptions.sort_by_key(|e| e.date);
    for pair in schedule.exceptions.windows(2) {
        if pair[0].date == pair[1].date {
            return Err(EngineError::InvalidSchedule("duplicate exception date"));
        }
    }
    for e in schedule.exceptions.iter_mut() {
        if e.date.0 < MIN_VALID_DATE_DAYS || e.date.0 > MAX_VALID_DATE_DAYS {
            return Err(EngineError::InvalidSchedule("exception date out of range"));
        }
        validate_slots(&mut e.slots)?;
    }
    Ok(())
}

fn validate_slots(slots: &mut Vec<TimeRange>) -> Result<(), EngineError> {
    if slots.len() > MAX_SLOTS_PER_DAY {
        return Err(EngineError::LimitExceeded("too many slots in one day"));
    }
    slots.sort_by_key(|s| s.start);
    for s in slots.iter() {
        if s.start >= s.end || s.end > MINUTES_PER_DAY {
            return Err(EngineError::InvalidSchedule("slot start must be before end"));
        }
    }
    for pair in slots.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(EngineError::InvalidSchedule("slots overlap"));
        }
    }
    Ok(())
}

// ── Schedule documents ────────────────────────────────────────────

// Hosts edit availability as a JSON document with HH:MM wall-clock times and
// ISO exception dates. Parsed here into the typed schedule.

#[derive(Deserialize)]
struct SlotDoc {
    start: String,
    end: String,
}

#[derive(Deserialize, Default)]
struct DayDoc {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    slots: Vec<SlotDoc>,
}

#[derive(Deserialize)]
struct ExceptionDoc {
    date: String,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    slots: Vec<SlotDoc>,
}

#[derive(Deserialize)]
struct ScheduleDoc {
    #[serde(default)]
    monday: DayDoc,
    #[serde(default)]
    tuesday: DayDoc,
    #[serde(default)]
    wednesday: DayDoc,
    #[serde(default)]
    thursday: DayDoc,
    #[serde(default)]
    friday: DayDoc,
    #[serde(default)]
    saturday: DayDoc,
    #[serde(default)]
    sunday: DayDoc,
    #[serde(default)]
    exceptions: Vec<ExceptionDoc>,
}

/// Parse and validate a host-authored schedule document.
pub fn parse_schedule(json: &str) -> Result<WeeklySchedule, EngineError> {
    let doc: ScheduleDoc = serde_json::from_str(json)
        .map_err(|_| EngineError::InvalidSchedule("malformed document"))?;
    let day_docs = [
        doc.monday,
        doc.tuesday,
        doc.wednesday,
        doc.thursday,
        doc.friday,
        doc.saturday,
        doc.sunday,
    ];
    let mut days: [DayRule; 7] = std::array::from_fn(|_| DayRule::closed());
    for (i, day) in day_docs.into_iter().enumerate() {
        days[i] = DayRule { enabled: day.enabled, slots: parse_slots(&day.slots)? };
    }
    let mut exceptions = Vec::with_capacity(doc.exceptions.len());
    for e in &doc.exceptions {
        let date =
            Date::parse(&e.date).ok_or(EngineError::InvalidSchedule("bad exception date"))?;
        exceptions.push(DateException {
            date,
            enabled: e.enabled,
            slots: parse_slots(&e.slots)?,
        });
    }
    let mut schedule = WeeklySchedule { days, exceptions };
    validate_schedule(&mut schedule)?;
    Ok(schedule)
}

fn parse_slots(docs: &[SlotDoc]) -> Result<Vec<TimeRange>, EngineError> {
    let mut slots = Vec::with_capacity(docs.len());
    for s in docs {
        let start = parse_hhmm(&s.start).ok_or(EngineError::InvalidSchedule("bad slot start"))?;
        let end = parse_hhmm(&s.end).ok_or(EngineError::InvalidSchedule("bad slot end"))?;
        if start >= end {
            return Err(EngineError::InvalidSchedule("slot start must be before end"));
        }
        slots.push(TimeRange { start, end });
    }
    Ok(slots)
}

// ── Free-window algebra ───────────────────────────────────────────

/// Free windows on a date: the open spans minus every stretch where live
/// claims saturate the space's capacity. Expired holds are invisible.
pub fn free_windows(rs: &SpaceState, date: Date, now: Ms) -> Vec<Span> {
    let open = open_spans(&rs.schedule, date);
    if open.is_empty() {
        return open;
    }
    let day = slot_span(date, None);
    let mut allocs: Vec<Span> = rs
        .overlapping(day)
        .filter(|c| match c.kind {
            ClaimKind::Hold { expires_at } => expires_at > now,
            ClaimKind::Booked => true,
        })
        .map(|c| Span::new(c.span.start.max(day.start), c.span.end.min(day.end)))
        .collect();
    if allocs.is_empty() {
        return open;
    }
    allocs.sort_by_key(|s| s.start);
    let busy = saturated_spans(&allocs, rs.capacity);
    if busy.is_empty() { open } else { subtract_spans(&open, &busy) }
}

/// Merge sorted overlapping/adjacent spans into disjoint spans.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Subtract sorted `to_remove` spans from sorted `base` spans.
pub fn subtract_spans(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

/// Sweep line over sorted allocations: the stretches where the live claim
/// count reaches `capacity`. Returns sorted, merged spans.
pub fn saturated_spans(allocs: &[Span], capacity: u32) -> Vec<Span> {
    if allocs.is_empty() || capacity == 0 {
        return Vec::new();
    }
    if capacity == 1 {
        return merge_overlapping(allocs);
    }

    // +1 at each start, -1 at each end; ends sort before starts at a tie so
    // back-to-back claims never read as saturated.
    let mut events: Vec<(Ms, i32)> = Vec::with_capacity(allocs.len() * 2);
    for a in allocs {
        events.push((a.start, 1));
        events.push((a.end, -1));
    }
    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut result = Vec::new();
    let mut count: u32 = 0;
    let mut saturated_start: Option<Ms> = None;

    for (time, delta) in &events {
        if *delta > 0 {
            count += *delta as u32;
        } else {
            count -= (-*delta) as u32;
        }

        if count >= capacity && saturated_start.is_none() {
            saturated_start = Some(*time);
        } else if count < capacity
            && let Some(start) = saturated_start.take()
            && *time > start
        {
            result.push(Span::new(start, *time));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn office_week() -> WeeklySchedule {
        let mut schedule = WeeklySchedule::closed();
        for i in 0..5 {
            schedule.days[i] =
                DayRule::open(vec![TimeRange::new(540, 720), TimeRange::new(780, 1_080)]);
        }
        schedule
    }

    fn space(capacity: u32, schedule: WeeklySchedule) -> SpaceState {
        let mut rs = SpaceState::new(
            Ulid::new(),
            SpaceConfig {
                host_id: Ulid::new(),
                name: None,
                confirmation: ConfirmationMode::Instant,
                policy: None,
                capacity,
                price_per_hour: Some(1_000),
                price_per_day: None,
            },
        );
        rs.schedule = schedule;
        rs
    }

    fn booked(rs: &mut SpaceState, date: Date, start: Minutes, end: Minutes) {
        rs.insert_claim(SlotClaim {
            booking_id: Ulid::new(),
            span: slot_span(date, Some(TimeRange::new(start, end))),
            kind: ClaimKind::Booked,
        });
    }

    const MONDAY: Date = Date(20_185); // 2025-04-07
    const SUNDAY: Date = Date(20_184); // 2025-04-06

    // ── is_open ───────────────────────────────────────────

    #[test]
    fn open_requires_full_containment_in_one_slot() {
        let schedule = office_week();
        assert!(is_open(&schedule, MONDAY, Some(TimeRange::new(540, 720))));
        assert!(is_open(&schedule, MONDAY, Some(TimeRange::new(600, 660))));
        // Crosses the lunch gap even though both endpoints are open.
        assert!(!is_open(&schedule, MONDAY, Some(TimeRange::new(660, 840))));
        assert!(!is_open(&schedule, MONDAY, Some(TimeRange::new(480, 600))));
    }

    #[test]
    fn closed_weekday_rejects_everything() {
        let schedule = office_week();
        assert!(!is_open(&schedule, SUNDAY, Some(TimeRange::new(600, 660))));
        assert!(!is_open(&schedule, SUNDAY, None));
    }

    #[test]
    fn exception_closure_beats_weekday_rule() {
        let mut schedule = office_week();
        schedule.exceptions.push(DateException { date: MONDAY, enabled: false, slots: vec![] });
        assert!(!is_open(&schedule, MONDAY, Some(TimeRange::new(600, 660))));
        assert!(is_open(&schedule, Date(MONDAY.0 + 7), Some(TimeRange::new(600, 660))));
    }

    #[test]
    fn exception_can_open_a_closed_day() {
        let mut schedule = office_week();
        schedule.exceptions.push(DateException {
            date: SUNDAY,
            enabled: true,
            slots: vec![TimeRange::new(600, 840)],
        });
        assert!(is_open(&schedule, SUNDAY, Some(TimeRange::new(600, 840))));
        assert!(!is_open(&schedule, SUNDAY, Some(TimeRange::new(540, 840))));
    }

    #[test]
    fn whole_day_needs_an_enabled_day_with_slots() {
        let schedule = office_week();
        assert!(is_open(&schedule, MONDAY, None));
        assert!(!is_open(&schedule, SUNDAY, None));
    }

    // ── schedule validation ───────────────────────────────

    #[test]
    fn validate_sorts_and_rejects_overlap() {
        let mut schedule = WeeklySchedule::closed();
        schedule.days[0] =
            DayRule::open(vec![TimeRange::new(780, 1_080), TimeRange::new(540, 720)]);
        assert!(validate_schedule(&mut schedule).is_ok());
        assert_eq!(schedule.days[0].slots[0].start, 540);

        schedule.days[0] =
            DayRule::open(vec![TimeRange::new(540, 800), TimeRange::new(780, 1_080)]);
        assert!(matches!(
            validate_schedule(&mut schedule),
            Err(EngineError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn validate_rejects_duplicate_exception_dates() {
        let mut schedule = WeeklySchedule::closed();
        schedule.exceptions.push(DateException { date: MONDAY, enabled: false, slots: vec![] });
        schedule.exceptions.push(DateException { date: MONDAY, enabled: true, slots: vec![] });
        assert!(matches!(
            validate_schedule(&mut schedule),
            Err(EngineError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn parse_schedule_round_trip() {
        let json = r#"{
            "monday": { "enabled": true, "slots": [
                { "start": "09:00", "end": "12:00" },
                { "start": "13:00", "end": "18:00" }
            ]},
            "saturday": { "enabled": true, "slots": [{ "start": "10:00", "end": "24:00" }] },
            "exceptions": [
                { "date": "2025-04-07", "enabled": false }
            ]
        }"#;
        let schedule = parse_schedule(json).unwrap();
        assert!(schedule.days[0].enabled);
        assert_eq!(schedule.days[0].slots.len(), 2);
        assert_eq!(schedule.days[5].slots, vec![TimeRange::new(600, 1_440)]);
        assert!(!schedule.days[1].enabled);
        assert_eq!(schedule.exceptions.len(), 1);
        assert!(!is_open(&schedule, MONDAY, Some(TimeRange::new(600, 660))));
    }

    #[test]
    fn parse_schedule_rejects_bad_times() {
        for json in [
            r#"{ "monday": { "enabled": true, "slots": [{ "start": "9:00", "end": "12:00" }] } }"#,
            r#"{ "monday": { "enabled": true, "slots": [{ "start": "12:00", "end": "09:00" }] } }"#,
            r#"{ "exceptions": [{ "date": "2025-02-30", "enabled": false }] }"#,
            r#"not json"#,
        ] {
            assert!(matches!(
                parse_schedule(json),
                Err(EngineError::InvalidSchedule(_))
            ));
        }
    }

    // ── free windows ──────────────────────────────────────

    #[test]
    fn booked_claim_splits_a_free_window() {
        let mut rs = space(1, office_week());
        booked(&mut rs, MONDAY, 600, 720);
        let free = free_windows(&rs, MONDAY, 0);
        assert_eq!(
            free,
            vec![
                slot_span(MONDAY, Some(TimeRange::new(540, 600))),
                slot_span(MONDAY, Some(TimeRange::new(780, 1_080))),
            ]
        );
    }

    #[test]
    fn expired_hold_frees_the_window() {
        let mut rs = space(1, office_week());
        rs.insert_claim(SlotClaim {
            booking_id: Ulid::new(),
            span: slot_span(MONDAY, Some(TimeRange::new(540, 720))),
            kind: ClaimKind::Hold { expires_at: 1_000 },
        });
        let free_before = free_windows(&rs, MONDAY, 999);
        assert_eq!(free_before.len(), 1);
        let free_after = free_windows(&rs, MONDAY, 1_000);
        assert_eq!(free_after.len(), 2);
        assert_eq!(free_after[0], slot_span(MONDAY, Some(TimeRange::new(540, 720))));
    }

    #[test]
    fn capacity_two_stays_free_under_one_claim() {
        let mut rs = space(2, office_week());
        booked(&mut rs, MONDAY, 540, 720);
        let free = free_windows(&rs, MONDAY, 0);
        assert_eq!(free.len(), 2);

        booked(&mut rs, MONDAY, 600, 660);
        let free = free_windows(&rs, MONDAY, 0);
        assert_eq!(
            free,
            vec![
                slot_span(MONDAY, Some(TimeRange::new(540, 600))),
                slot_span(MONDAY, Some(TimeRange::new(660, 720))),
                slot_span(MONDAY, Some(TimeRange::new(780, 1_080))),
            ]
        );
    }

    #[test]
    fn whole_day_claim_blanks_the_date() {
        let mut rs = space(1, office_week());
        rs.insert_claim(SlotClaim {
            booking_id: Ulid::new(),
            span: slot_span(MONDAY, None),
            kind: ClaimKind::Booked,
        });
        assert!(free_windows(&rs, MONDAY, 0).is_empty());
    }

    // ── span algebra ──────────────────────────────────────

    #[test]
    fn subtract_middle_punch() {
        let base = vec![Span::new(100, 300)];
        let remove = vec![Span::new(150, 200)];
        assert_eq!(
            subtract_spans(&base, &remove),
            vec![Span::new(100, 150), Span::new(200, 300)]
        );
    }

    #[test]
    fn subtract_no_overlap() {
        let base = vec![Span::new(100, 200), Span::new(300, 400)];
        let remove = vec![Span::new(200, 300)];
        assert_eq!(subtract_spans(&base, &remove), base);
    }

    #[test]
    fn merge_overlapping_and_adjacent() {
        let spans = vec![Span::new(100, 300), Span::new(200, 400), Span::new(400, 500)];
        assert_eq!(merge_overlapping(&spans), vec![Span::new(100, 500)]);
    }

    #[test]
    fn saturated_spans_need_capacity_overlaps() {
        let allocs = vec![Span::new(0, 100), Span::new(50, 150)];
        assert_eq!(saturated_spans(&allocs, 2), vec![Span::new(50, 100)]);
        assert!(saturated_spans(&allocs, 3).is_empty());
        assert_eq!(
            saturated_spans(&allocs, 1),
            vec![Span::new(0, 150)]
        );
    }

    #[test]
    fn saturated_spans_tie_at_handover_is_not_saturated() {
        let allocs = vec![Span::new(0, 100), Span::new(100, 200)];
        assert!(saturated_spans(&allocs, 2).is_empty());
    }
}
