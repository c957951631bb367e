use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{self, is_open};
use super::conflict::{check_no_conflict, validate_date, validate_slot};
use super::{Engine, EngineError, SharedSpaceState};

/// Project absolute spans inside `date` back onto its wall clock.
fn to_time_ranges(date: Date, spans: &[Span]) -> Vec<TimeRange> {
    let midnight = date.to_ms();
    spans
        .iter()
        .map(|s| TimeRange {
            start: ((s.start - midnight) / MS_PER_MINUTE) as Minutes,
            end: ((s.end - midnight) / MS_PER_MINUTE) as Minutes,
        })
        .collect()
}

impl Engine {
    /// Whether a reservation for the slot would be admitted right now: the
    /// schedule is open over it and no live claim saturates it.
    pub async fn check_availability(
        &self,
        space_id: Ulid,
        date: Date,
        slot: Option<TimeRange>,
    ) -> Result<bool, EngineError> {
        validate_date(date)?;
        validate_slot(slot)?;
        let rs = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = rs.read().await;
        if !is_open(&guard.schedule, date, slot) {
            return Ok(false);
        }
        let now = self.now_ms();
        Ok(check_no_conflict(&guard, slot_span(date, slot), now, None).is_ok())
    }

    /// Free wall-clock windows on a date, optionally only those at least
    /// `min_duration` minutes long.
    pub async fn free_windows(
        &self,
        space_id: Ulid,
        date: Date,
        min_duration: Option<Minutes>,
    ) -> Result<Vec<TimeRange>, EngineError> {
        validate_date(date)?;
        let rs = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = rs.read().await;
        let now = self.now_ms();
        let mut windows = to_time_ranges(date, &availability::free_windows(&guard, date, now));
        if let Some(min) = min_duration {
            windows.retain(|w| w.duration_minutes() >= min);
        }
        Ok(windows)
    }

    /// Per-date free windows over an inclusive date range. A reversed range
    /// is empty rather than an error.
    pub async fn free_windows_range(
        &self,
        space_id: Ulid,
        from: Date,
        to: Date,
    ) -> Result<Vec<(Date, Vec<TimeRange>)>, EngineError> {
        validate_date(from)?;
        let rs = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        if to < from {
            return Ok(Vec::new());
        }
        validate_date(to)?;
        if to.0 - from.0 + 1 > MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let guard = rs.read().await;
        let now = self.now_ms();
        let mut out = Vec::new();
        let mut date = from;
        while date <= to {
            let free = availability::free_windows(&guard, date, now);
            out.push((date, to_time_ranges(date, &free)));
            date = date.next();
        }
        Ok(out)
    }

    pub async fn get_booking(&self, booking_id: Ulid) -> Result<BookingRecord, EngineError> {
        let space_id = self
            .space_of_booking(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let rs = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = rs.read().await;
        guard.bookings.get(&booking_id).cloned().ok_or(EngineError::BookingNotFound(booking_id))
    }

    /// Every booking taken on a space, terminal ones included, ordered by
    /// occupied span then id.
    pub async fn list_bookings(&self, space_id: Ulid) -> Result<Vec<BookingRecord>, EngineError> {
        let rs = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = rs.read().await;
        let mut bookings: Vec<BookingRecord> = guard.bookings.values().cloned().collect();
        bookings.sort_by_key(|b| (b.span().start, b.id));
        Ok(bookings)
    }

    pub async fn get_space(&self, space_id: Ulid) -> Result<SpaceInfo, EngineError> {
        let rs = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = rs.read().await;
        Ok(SpaceInfo::of(&guard))
    }

    pub async fn list_spaces(&self) -> Vec<SpaceInfo> {
        let spaces: Vec<SharedSpaceState> =
            self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(spaces.len());
        for rs in spaces {
            let guard = rs.read().await;
            out.push(SpaceInfo::of(&guard));
        }
        out.sort_by_key(|s| s.id);
        out
    }
}
