use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{is_open, parse_schedule, validate_schedule};
use super::conflict::{check_no_conflict, validate_date, validate_slot};
use super::lifecycle::{
    BookingEvent, CancelOutcome, Effect, NoticeKind, NotifyParty, Transition, cancellable,
    initial_status, next_status,
};
use super::policy::{compute_cancellation, posted_price, resolve_gross, resolve_policy};
use super::{Engine, EngineError, JournalCommand};

fn validate_config(config: &SpaceConfig) -> Result<(), EngineError> {
    if let Some(ref n) = config.name
        && n.len() > MAX_NAME_LEN
    {
        return Err(EngineError::LimitExceeded("space name too long"));
    }
    if config.capacity == 0 || config.capacity > MAX_CAPACITY {
        return Err(EngineError::LimitExceeded("capacity out of range"));
    }
    for price in [config.price_per_hour, config.price_per_day].into_iter().flatten() {
        if !(0..=MAX_PRICE_CENTS).contains(&price) {
            return Err(EngineError::LimitExceeded("price out of range"));
        }
    }
    Ok(())
}

impl Engine {
    pub async fn register_space(&self, id: Ulid, config: SpaceConfig) -> Result<(), EngineError> {
        if self.state.len() >= MAX_SPACES {
            return Err(EngineError::LimitExceeded("too many spaces"));
        }
        validate_config(&config)?;
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::SpaceRegistered { id, config: config.clone() };
        self.journal_append(&event).await?;
        let rs = SpaceState::new(id, config);
        self.state.insert(id, Arc::new(RwLock::new(rs)));
        self.notify.send(id, &event);
        metrics::gauge!(crate::observability::SPACES_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }

    /// Rewrite a space's registration fields. Capacity may shrink below the
    /// number of live claims; the approval re-check catches requests that no
    /// longer fit.
    pub async fn update_space(&self, id: Ulid, config: SpaceConfig) -> Result<(), EngineError> {
        validate_config(&config)?;
        let rs = self.get_space_state(&id).ok_or(EngineError::SpaceNotFound(id))?;
        let mut guard = rs.write().await;

        let event = Event::SpaceUpdated { id, config };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    /// Swap in a whole new weekly schedule. Existing bookings keep their
    /// claims even where the new schedule closes the space.
    pub async fn replace_schedule(
        &self,
        space_id: Ulid,
        mut schedule: WeeklySchedule,
    ) -> Result<(), EngineError> {
        validate_schedule(&mut schedule)?;
        let rs = self.get_space_state(&space_id).ok_or(EngineError::SpaceNotFound(space_id))?;
        let mut guard = rs.write().await;

        let event = Event::ScheduleReplaced { space_id, schedule };
        self.persist_and_apply(space_id, &mut guard, &event).await
    }

    /// Parse a host-authored schedule document and install it.
    pub async fn replace_schedule_doc(
        &self,
        space_id: Ulid,
        json: &str,
    ) -> Result<(), EngineError> {
        let schedule = parse_schedule(json)?;
        self.replace_schedule(space_id, schedule).await
    }

    /// Remove a space with no live hold and no upcoming booking. The check
    /// and the unlink run under the space's write lock, so a reservation
    /// racing this call either lands before the check or wakes to find the
    /// space gone.
    pub async fn remove_space(&self, id: Ulid) -> Result<(), EngineError> {
        let rs = self.get_space_state(&id).ok_or(EngineError::SpaceNotFound(id))?;
        let guard = rs.write().await;
        let now = self.now_ms();
        let live = guard.claims.iter().any(|c| match c.kind {
            ClaimKind::Hold { expires_at } => expires_at > now,
            ClaimKind::Booked => c.span.end > now,
        });
        if live {
            return Err(EngineError::HasLiveBookings(id));
        }

        let event = Event::SpaceRemoved { id };
        self.journal_append(&event).await?;
        self.state.remove(&id);
        self.booking_to_space.retain(|_, sid| *sid != id);
        drop(guard);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        metrics::gauge!(crate::observability::SPACES_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }

    /// Take a reservation. The per-space write lock makes the conflict check
    /// and the claim it admits one atomic step, so two racing requests for
    /// the same slot serialize and the loser gets the conflict.
    pub async fn create_reservation(
        &self,
        id: Ulid,
        req: ReservationRequest,
    ) -> Result<BookingRecord, EngineError> {
        validate_date(req.date)?;
        validate_slot(req.slot)?;
        if let Some(ttl) = req.ttl_ms
            && !(1..=MAX_HOLD_TTL_MS).contains(&ttl)
        {
            return Err(EngineError::LimitExceeded("hold ttl out of range"));
        }
        if self.booking_to_space.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let rs = self
            .get_space_state(&req.space_id)
            .ok_or(EngineError::SpaceNotFound(req.space_id))?;
        let mut guard = rs.write().await;
        // The space may have been removed while this call waited on the lock.
        if !self.state.contains_key(&req.space_id) {
            return Err(EngineError::SpaceNotFound(req.space_id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_SPACE {
            return Err(EngineError::LimitExceeded("too many bookings on space"));
        }
        if req.coworker_id == guard.host_id {
            return Err(EngineError::SelfBooking);
        }
        if !is_open(&guard.schedule, req.date, req.slot) {
            return Err(EngineError::NotOpen);
        }

        let now = self.now_ms();
        if let Err(e) = check_no_conflict(&guard, slot_span(req.date, req.slot), now, None) {
            metrics::counter!(crate::observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        // A derived price past the payment cap would make the booking
        // impossible to pay; refuse it up front.
        let price = posted_price(&guard, req.slot);
        if let Some(p) = price
            && p > MAX_PRICE_CENTS
        {
            return Err(EngineError::LimitExceeded("derived price out of range"));
        }

        let ttl = req.ttl_ms.unwrap_or(match guard.confirmation {
            ConfirmationMode::Instant => DEFAULT_HOLD_TTL_MS,
            ConfirmationMode::HostApproval => DEFAULT_APPROVAL_TTL_MS,
        });
        let event = Event::BookingRequested {
            id,
            space_id: req.space_id,
            coworker_id: req.coworker_id,
            date: req.date,
            slot: req.slot,
            status: initial_status(guard.confirmation),
            policy: resolve_policy(req.policy_override, guard.policy),
            price,
            reserved_until: now + ttl,
            invoice_requested: req.invoice_requested,
        };
        self.persist_and_apply(req.space_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::RESERVATIONS_TOTAL).increment(1);
        guard.bookings.get(&id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    /// Drive a booking through one lifecycle event. Passing `expected_version`
    /// opts in to optimistic concurrency: the move only runs while the record
    /// still carries that version.
    pub async fn transition(
        &self,
        booking_id: Ulid,
        event: BookingEvent,
        expected_version: Option<u64>,
    ) -> Result<Transition, EngineError> {
        if let BookingEvent::HostRejected { reason: Some(ref r) } = event
            && r.len() > MAX_REASON_LEN
        {
            return Err(EngineError::LimitExceeded("reason too long"));
        }

        let (space_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;

        if let Some(expected) = expected_version
            && expected != booking.version
        {
            return Err(EngineError::StaleVersion { expected, actual: booking.version });
        }
        if booking.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal(booking.status));
        }
        let to = next_status(booking.status, &event).ok_or(EngineError::IllegalTransition {
            from: booking.status,
            event: event.name(),
        })?;

        let now = self.now_ms();
        let hold_live = matches!(booking.reserved_until, Some(d) if d > now);

        let mut effects = Vec::new();
        match &event {
            BookingEvent::HostApproved => {
                if !hold_live {
                    return Err(EngineError::HoldLapsed(booking_id));
                }
                // The space may have shrunk since the request was taken;
                // re-check before the hold turns into a payment window.
                check_no_conflict(&guard, booking.span(), now, Some(booking_id))?;
                effects.push(Effect::Notify {
                    party: NotifyParty::Coworker,
                    kind: NoticeKind::PaymentRequired,
                });
            }
            BookingEvent::HostRejected { .. } => {
                effects.push(Effect::Notify {
                    party: NotifyParty::Coworker,
                    kind: NoticeKind::RequestRejected,
                });
            }
            BookingEvent::PaymentCompleted { amount, .. } => {
                if !hold_live {
                    return Err(EngineError::HoldLapsed(booking_id));
                }
                if !(1..=MAX_PRICE_CENTS).contains(amount) {
                    return Err(EngineError::LimitExceeded("payment amount out of range"));
                }
                if let Some(expected) = booking.price
                    && *amount != expected
                {
                    return Err(EngineError::PaymentMismatch { expected, got: *amount });
                }
                effects.push(Effect::Notify {
                    party: NotifyParty::Coworker,
                    kind: NoticeKind::BookingConfirmed,
                });
                effects.push(Effect::Notify {
                    party: NotifyParty::Host,
                    kind: NoticeKind::BookingConfirmed,
                });
            }
            BookingEvent::CheckedIn => {
                let span = booking.span();
                let opens = span.start - CHECKIN_EARLY_MS;
                if now < opens || now >= span.end {
                    return Err(EngineError::OutsideCheckInWindow { start: opens, end: span.end });
                }
            }
            BookingEvent::CheckedOut => {}
            BookingEvent::Settled => {
                effects.push(Effect::Notify {
                    party: NotifyParty::Host,
                    kind: NoticeKind::BookingServed,
                });
                effects.push(Effect::ReleasePayout { amount: resolve_gross(&guard, &booking) });
            }
            BookingEvent::HoldExpired => {
                if hold_live {
                    return Err(EngineError::HoldStillLive(booking_id));
                }
                effects.push(Effect::Notify {
                    party: NotifyParty::Coworker,
                    kind: NoticeKind::HoldExpired,
                });
            }
        }

        let event_name = event.name();
        match event {
            BookingEvent::PaymentCompleted { payment_id, amount } => {
                let paid = Event::PaymentRecorded {
                    booking_id,
                    space_id,
                    payment_id,
                    amount,
                    status: PaymentStatus::Completed,
                };
                self.persist_and_apply(space_id, &mut guard, &paid).await?;
                let moved = Event::BookingTransitioned {
                    id: booking_id,
                    space_id,
                    to,
                    at: now,
                    reserved_until: None,
                    reason: None,
                };
                self.persist_and_apply(space_id, &mut guard, &moved).await?;
            }
            BookingEvent::HoldExpired if booking.status == BookingStatus::PendingPayment => {
                // An unpaid hold dies as a system cancellation so the record
                // keeps who dropped it and when.
                let dropped = Event::BookingCancelled {
                    id: booking_id,
                    space_id,
                    by: CancelParty::System,
                    reason: Some("payment window lapsed".into()),
                    refund: 0,
                    penalty: 0,
                    at: now,
                };
                self.persist_and_apply(space_id, &mut guard, &dropped).await?;
            }
            other => {
                let reserved_until = (to == BookingStatus::PendingPayment).then(|| {
                    now + if booking.invoice_requested {
                        PAYMENT_TTL_INVOICE_MS
                    } else {
                        PAYMENT_TTL_MS
                    }
                });
                let reason = match other {
                    BookingEvent::HostRejected { reason } => reason,
                    BookingEvent::HoldExpired => Some("approval window lapsed".into()),
                    _ => None,
                };
                let moved = Event::BookingTransitioned {
                    id: booking_id,
                    space_id,
                    to,
                    at: now,
                    reserved_until,
                    reason,
                };
                self.persist_and_apply(space_id, &mut guard, &moved).await?;
            }
        }

        metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "event" => event_name)
            .increment(1);
        let booking = guard
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        Ok(Transition { booking, effects })
    }

    /// Cancel a booking. Hosts and the system always refund in full; a
    /// coworker's own cancellation settles through the policy snapshot taken
    /// at creation.
    pub async fn cancel(
        &self,
        booking_id: Ulid,
        by: CancelParty,
        reason: Option<String>,
        expected_version: Option<u64>,
    ) -> Result<CancelOutcome, EngineError> {
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN
        {
            return Err(EngineError::LimitExceeded("reason too long"));
        }

        let (space_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;

        if let Some(expected) = expected_version
            && expected != booking.version
        {
            return Err(EngineError::StaleVersion { expected, actual: booking.version });
        }
        if booking.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal(booking.status));
        }
        if !cancellable(booking.status) {
            return Err(EngineError::IllegalTransition { from: booking.status, event: "cancel" });
        }

        let now = self.now_ms();
        let refund = compute_cancellation(&guard, &booking, by, now);

        let mut effects = vec![
            Effect::Notify { party: NotifyParty::Coworker, kind: NoticeKind::BookingCancelled },
            Effect::Notify { party: NotifyParty::Host, kind: NoticeKind::BookingCancelled },
        ];
        if refund.refund > 0
            && let Some(payment) = booking.completed_payment()
        {
            effects.push(Effect::IssueRefund { payment_id: payment.id, amount: refund.refund });
        }

        let event = Event::BookingCancelled {
            id: booking_id,
            space_id,
            by,
            reason,
            refund: refund.refund,
            penalty: refund.penalty,
            at: now,
        };
        self.persist_and_apply(space_id, &mut guard, &event).await?;
        metrics::counter!(
            crate::observability::CANCELLATIONS_TOTAL,
            "by" => by.as_str(),
            "tier" => booking.policy.as_str()
        )
        .increment(1);
        metrics::histogram!(crate::observability::REFUND_CENTS).record(refund.refund as f64);

        let booking = guard
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        Ok(CancelOutcome { booking, refund, effects })
    }

    /// Booking/space pairs whose hold deadline has passed. Spaces whose lock
    /// is held are skipped; the next sweep picks them up.
    pub fn collect_lapsed_holds(&self, now: Ms) -> Vec<(Ulid, Ulid)> {
        let mut lapsed = Vec::new();
        for entry in self.state.iter() {
            let rs = entry.value().clone();
            if let Ok(guard) = rs.try_read() {
                for claim in &guard.claims {
                    if let ClaimKind::Hold { expires_at } = claim.kind
                        && expires_at <= now
                    {
                        lapsed.push((claim.booking_id, guard.id));
                    }
                }
            }
        }
        lapsed
    }

    /// Expire every lapsed hold, returning how many moved. Races with live
    /// callers are harmless: a hold paid or rejected between collection and
    /// expiry just fails its guard and stays put.
    pub async fn sweep_lapsed_holds(&self, now: Ms) -> usize {
        let mut swept = 0;
        for (booking_id, space_id) in self.collect_lapsed_holds(now) {
            match self.transition(booking_id, BookingEvent::HoldExpired, None).await {
                Ok(_) => {
                    swept += 1;
                    metrics::counter!(crate::observability::HOLDS_EXPIRED_TOTAL).increment(1);
                    tracing::debug!(%booking_id, %space_id, "expired lapsed hold");
                }
                Err(EngineError::JournalError(e)) => {
                    tracing::warn!(%booking_id, error = %e, "sweep could not journal expiry");
                }
                Err(_) => {}
            }
        }
        swept
    }

    /// Rewrite the journal with just the events that recreate current state.
    /// Synthetic transitions carry `at: 0`; the original instants are not
    /// retained, and replayed versions restart from the shortened history.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        fn emit_booking(events: &mut Vec<Event>, b: &BookingRecord) {
            let requested = |status: BookingStatus, reserved_until: Ms| Event::BookingRequested {
                id: b.id,
                space_id: b.space_id,
                coworker_id: b.coworker_id,
                date: b.date,
                slot: b.slot,
                status,
                policy: b.policy,
                price: b.price,
                reserved_until,
                invoice_requested: b.invoice_requested,
            };
            let transitioned =
                |to: BookingStatus, reason: Option<String>| Event::BookingTransitioned {
                    id: b.id,
                    space_id: b.space_id,
                    to,
                    at: 0,
                    reserved_until: None,
                    reason,
                };
            let payments = b.payments.iter().map(|p| Event::PaymentRecorded {
                booking_id: b.id,
                space_id: b.space_id,
                payment_id: p.id,
                amount: p.amount,
                status: p.status,
            });
            match b.status {
                BookingStatus::PendingPayment | BookingStatus::PendingApproval => {
                    events.push(requested(b.status, b.reserved_until.unwrap_or(0)));
                }
                BookingStatus::Confirmed
                | BookingStatus::CheckedIn
                | BookingStatus::CheckedOut
                | BookingStatus::Served => {
                    events.push(requested(BookingStatus::PendingPayment, 0));
                    events.extend(payments);
                    events.push(transitioned(BookingStatus::Confirmed, None));
                    if b.status != BookingStatus::Confirmed {
                        events.push(transitioned(b.status, None));
                    }
                }
                BookingStatus::Cancelled => {
                    events.push(requested(BookingStatus::PendingPayment, 0));
                    events.extend(payments);
                    let c = b.cancellation.clone().unwrap_or(CancellationRecord {
                        by: CancelParty::System,
                        reason: None,
                        at: 0,
                        refund: 0,
                        penalty: 0,
                    });
                    events.push(Event::BookingCancelled {
                        id: b.id,
                        space_id: b.space_id,
                        by: c.by,
                        reason: c.reason,
                        refund: c.refund,
                        penalty: c.penalty,
                        at: c.at,
                    });
                }
                BookingStatus::Rejected => {
                    events.push(requested(BookingStatus::PendingApproval, 0));
                    events.push(transitioned(BookingStatus::Rejected, b.rejection_reason.clone()));
                }
            }
        }

        let mut events = Vec::new();
        let space_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in space_ids {
            let Some(rs) = self.get_space_state(&id) else { continue };
            let guard = rs.read().await;
            events.push(Event::SpaceRegistered { id: guard.id, config: guard.config() });
            events.push(Event::ScheduleReplaced {
                space_id: guard.id,
                schedule: guard.schedule.clone(),
            });
            for b in guard.bookings.values() {
                emit_booking(&mut events, b);
            }
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
