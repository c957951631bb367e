mod availability;
mod conflict;
mod error;
mod lifecycle;
mod mutations;
mod policy;
mod queries;

pub use availability::{
    free_windows, is_open, merge_overlapping, open_spans, parse_schedule, saturated_spans,
    subtract_spans, validate_schedule,
};
pub use conflict::find_conflicts;
pub use error::{EngineError, ErrorKind};
pub use lifecycle::{
    BookingEvent, CancelOutcome, Effect, NoticeKind, NotifyParty, Transition, cancellable,
    initial_status, next_status,
};
pub use policy::{
    compute_cancellation, penalty_percentage, posted_price, resolve_gross, resolve_policy,
    split_refund,
};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::clock::{Clock, SystemClock};
use crate::journal::Journal;
use crate::model::*;
use crate::notify::NotifyHub;

pub type SharedSpaceState = Arc<RwLock<SpaceState>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and turns a burst of appends into
/// one fsync. An append blocks on its oneshot until the batch it rode in on
/// is durable, so callers see the same guarantee as a per-event sync at a
/// fraction of the cost.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Everything already queued behind the first append rides in
                // the same commit. A compact or counter query cuts the batch
                // short; the batch commits before it runs.
                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            commit_batch(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                if !batch.is_empty() {
                    commit_batch(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn commit_batch(journal: &mut Journal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut buffer_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = journal.buffer(event) {
            buffer_err = Some(e);
            break;
        }
    }
    // Commit even after a buffer error so partial bytes of a failed batch do
    // not ride silently into the next one.
    let commit_err = journal.commit().err();
    let result = match buffer_err.or(commit_err) {
        Some(e) => Err(e),
        None => Ok(()),
    };

    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::stage_rewrite(journal.path(), &events)
                .and_then(|()| journal.finish_rewrite());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_rewrite());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine. Spaces live under independent `RwLock`s in a
/// `DashMap`; every mutation journals its event, applies it to the locked
/// space, then fans it out to subscribers.
pub struct Engine {
    pub state: DashMap<Ulid, SharedSpaceState>,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: booking id → space id.
    pub(super) booking_to_space: DashMap<Ulid, Ulid>,
    pub(super) clock: Arc<dyn Clock>,
}

/// Apply an event directly to a SpaceState (no locking — caller holds the lock).
fn apply_to_space(rs: &mut SpaceState, event: &Event, booking_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::SpaceUpdated { config, .. } => {
            rs.apply_config(config.clone());
        }
        Event::ScheduleReplaced { schedule, .. } => {
            rs.schedule = schedule.clone();
        }
        Event::BookingRequested {
            id,
            space_id,
            coworker_id,
            date,
            slot,
            status,
            policy,
            price,
            reserved_until,
            invoice_requested,
        } => {
            let record = BookingRecord {
                id: *id,
                space_id: *space_id,
                coworker_id: *coworker_id,
                date: *date,
                slot: *slot,
                status: *status,
                policy: *policy,
                price: *price,
                reserved_until: Some(*reserved_until),
                invoice_requested: *invoice_requested,
                rejection_reason: None,
                payments: Vec::new(),
                cancellation: None,
                version: 1,
            };
            rs.insert_claim(SlotClaim {
                booking_id: *id,
                span: record.span(),
                kind: ClaimKind::Hold { expires_at: *reserved_until },
            });
            rs.bookings.insert(*id, record);
            booking_map.insert(*id, *space_id);
        }
        Event::BookingTransitioned { id, to, reserved_until, reason, .. } => {
            if let Some(b) = rs.bookings.get_mut(id) {
                b.status = *to;
                b.version += 1;
                b.reserved_until = if to.is_pending() { *reserved_until } else { None };
                if *to == BookingStatus::Rejected {
                    b.rejection_reason = reason.clone();
                }
            }
            match to {
                BookingStatus::PendingPayment | BookingStatus::PendingApproval => {
                    if let Some(deadline) = reserved_until
                        && let Some(claim) = rs.claim_mut(*id)
                    {
                        claim.kind = ClaimKind::Hold { expires_at: *deadline };
                    }
                }
                BookingStatus::Confirmed => {
                    if let Some(claim) = rs.claim_mut(*id) {
                        claim.kind = ClaimKind::Booked;
                    }
                }
                BookingStatus::Cancelled | BookingStatus::Rejected => {
                    rs.remove_claim(*id);
                }
                BookingStatus::CheckedIn | BookingStatus::CheckedOut | BookingStatus::Served => {}
            }
        }
        Event::BookingCancelled { id, by, reason, refund, penalty, at, .. } => {
            if let Some(b) = rs.bookings.get_mut(id) {
                b.status = BookingStatus::Cancelled;
                b.version += 1;
                b.reserved_until = None;
                b.cancellation = Some(CancellationRecord {
                    by: *by,
                    reason: reason.clone(),
                    at: *at,
                    refund: *refund,
                    penalty: *penalty,
                });
                if *refund > 0
                    && let Some(p) =
                        b.payments.iter_mut().find(|p| p.status == PaymentStatus::Completed)
                {
                    p.status = PaymentStatus::Refunded;
                }
            }
            rs.remove_claim(*id);
        }
        Event::PaymentRecorded { booking_id, payment_id, amount, status, .. } => {
            if let Some(b) = rs.bookings.get_mut(booking_id) {
                if let Some(p) = b.payments.iter_mut().find(|p| p.id == *payment_id) {
                    p.status = *status;
                } else {
                    b.payments.push(PaymentRecord {
                        id: *payment_id,
                        amount: *amount,
                        status: *status,
                    });
                }
                b.version += 1;
            }
        }
        // SpaceRegistered/SpaceRemoved are handled at the DashMap level, not here
        Event::SpaceRegistered { .. } | Event::SpaceRemoved { .. } => {}
    }
}

impl Engine {
    /// Open the journal at `journal_path`, replay it, and start the
    /// background writer. Runs on the wall clock; tests inject their own
    /// through [`Engine::with_clock`].
    pub fn new(journal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        Self::with_clock(journal_path, notify, Arc::new(SystemClock))
    }

    pub fn with_clock(
        journal_path: PathBuf,
        notify: Arc<NotifyHub>,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let events = Journal::load(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            state: DashMap::new(),
            journal_tx,
            notify,
            booking_to_space: DashMap::new(),
            clock,
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::SpaceRegistered { id, config } => {
                    let rs = SpaceState::new(*id, config.clone());
                    engine.state.insert(*id, Arc::new(RwLock::new(rs)));
                }
                Event::SpaceRemoved { id } => {
                    engine.state.remove(id);
                    engine.booking_to_space.retain(|_, sid| *sid != *id);
                }
                other => {
                    if let Some(space_id) = event_space_id(other)
                        && let Some(entry) = engine.state.get(&space_id)
                    {
                        let rs_arc = entry.clone();
                        let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                        apply_to_space(&mut guard, other, &engine.booking_to_space);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Current instant from the injected clock.
    pub fn now_ms(&self) -> Ms {
        self.clock.now_ms()
    }

    /// Write an event to the journal via the background group-commit writer.
    async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append { event: event.clone(), response: tx })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub fn get_space_state(&self, id: &Ulid) -> Option<SharedSpaceState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn space_of_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_space.get(booking_id).map(|e| *e.value())
    }

    /// Journal-append + apply + notify in one call.
    pub(super) async fn persist_and_apply(
        &self,
        space_id: Ulid,
        rs: &mut SpaceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.journal_append(event).await?;
        apply_to_space(rs, event, &self.booking_to_space);
        self.notify.send(space_id, event);
        Ok(())
    }

    /// Lookup booking → space, get the space, acquire its write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<SpaceState>), EngineError> {
        let space_id = self
            .space_of_booking(booking_id)
            .ok_or(EngineError::BookingNotFound(*booking_id))?;
        let rs = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = rs.write_owned().await;
        Ok((space_id, guard))
    }
}

/// Extract the space id from an event (for non-Register/Remove events).
fn event_space_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ScheduleReplaced { space_id, .. }
        | Event::BookingRequested { space_id, .. }
        | Event::BookingTransitioned { space_id, .. }
        | Event::BookingCancelled { space_id, .. }
        | Event::PaymentRecorded { space_id, .. } => Some(*space_id),
        Event::SpaceUpdated { id, .. } => Some(*id),
        Event::SpaceRegistered { .. } | Event::SpaceRemoved { .. } => None,
    }
}
