mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
pub mod transitions;

pub use availability::{merge_overlapping, subtract_intervals};
pub use conflict::now_ms;
pub use error::EngineError;
pub use mutations::{AppointmentOverride, AppointmentUpdate, NewSessionNote};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedCounselorState = Arc<RwLock<CounselorState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed: {e}");
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Authoritative appointment store.
///
/// State is partitioned by counselor. Every mutation of a counselor's calendar
/// holds that counselor's write lock from validation through the WAL append, so
/// conflicting bookings for one counselor are serialized.
pub struct Engine {
    pub(super) counselors: DashMap<Ulid, SharedCounselorState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: appointment id → counselor id
    pub(super) appointment_to_counselor: DashMap<Ulid, Ulid>,
    /// Reverse lookup: session note id → counselor id
    pub(super) note_to_counselor: DashMap<Ulid, Ulid>,
    /// Serializes counselor creation/removal against each other and compaction.
    pub(super) directory: Mutex<()>,
}

/// Id indexes kept beside the counselor map.
struct Indexes<'a> {
    appointments: &'a DashMap<Ulid, Ulid>,
    notes: &'a DashMap<Ulid, Ulid>,
}

/// Apply an event to a CounselorState. Caller holds the lock.
fn apply_to_counselor(cs: &mut CounselorState, event: &Event, index: Indexes<'_>) {
    match event {
        Event::CounselorUpdated { profile, .. } => {
            cs.profile = profile.clone();
        }
        Event::AppointmentBooked { appointment } => {
            index.appointments.insert(appointment.id, appointment.counselor_id);
            cs.insert_appointment(appointment.clone());
        }
        Event::AppointmentStatusChanged { id, status, at, .. } => {
            if let Some(a) = cs.appointment_mut(*id) {
                a.status = *status;
                a.updated_at = *at;
            }
        }
        Event::AppointmentRevised { id, span, status, notes, at, .. } => {
            // Re-insert to keep the calendar sorted by start.
            if let Some(mut a) = cs.remove_appointment(*id) {
                if let Some(span) = span {
                    a.span = *span;
                }
                if let Some(status) = status {
                    a.status = *status;
                }
                if let Some(notes) = notes {
                    a.notes = notes.clone();
                }
                a.updated_at = *at;
                cs.insert_appointment(a);
            }
        }
        Event::AppointmentDeleted { id, .. } => {
            cs.remove_appointment(*id);
            index.appointments.remove(id);
        }
        Event::SessionNoteCreated { note } | Event::SessionNoteUpdated { note } => {
            index.notes.insert(note.id, note.counselor_id);
            cs.upsert_session_note(note.clone());
        }
        Event::SessionNoteDeleted { id, .. } => {
            cs.remove_session_note(*id);
            index.notes.remove(id);
        }
        // CounselorCreated/Deleted are handled at the DashMap level, not here
        Event::CounselorCreated { .. } | Event::CounselorDeleted { .. } => {}
    }
}

/// Extract the counselor an event applies to (for non-Create/Delete events).
fn event_counselor_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::CounselorUpdated { id, .. } => Some(*id),
        Event::AppointmentBooked { appointment } => Some(appointment.counselor_id),
        Event::SessionNoteCreated { note } | Event::SessionNoteUpdated { note } => Some(note.counselor_id),
        Event::AppointmentStatusChanged { counselor_id, .. }
        | Event::AppointmentRevised { counselor_id, .. }
        | Event::AppointmentDeleted { counselor_id, .. }
        | Event::SessionNoteDeleted { counselor_id, .. } => Some(*counselor_id),
        Event::CounselorCreated { .. } | Event::CounselorDeleted { .. } => None,
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            counselors: DashMap::new(),
            wal_tx,
            appointment_to_counselor: DashMap::new(),
            note_to_counselor: DashMap::new(),
            directory: Mutex::new(()),
        };

        // Replay events. We're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never use blocking_write here: this runs inside
        // an async context.
        for event in &events {
            match event {
                Event::CounselorCreated { id, profile } => {
                    let cs = CounselorState::new(*id, profile.clone());
                    engine.counselors.insert(*id, Arc::new(RwLock::new(cs)));
                }
                Event::CounselorDeleted { id } => {
                    engine.counselors.remove(id);
                }
                other => {
                    if let Some(counselor_id) = event_counselor_id(other)
                        && let Some(entry) = engine.counselors.get(&counselor_id)
                    {
                        let cs = entry.clone();
                        drop(entry);
                        let Ok(mut guard) = cs.try_write() else {
                            tracing::warn!("replay: counselor {counselor_id} unexpectedly locked");
                            continue;
                        };
                        apply_to_counselor(&mut guard, other, engine.indexes());
                    }
                }
            }
        }

        tracing::info!(
            events = events.len(),
            counselors = engine.counselors.len(),
            appointments = engine.appointment_to_counselor.len(),
            session_notes = engine.note_to_counselor.len(),
            "engine state replayed"
        );
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_counselor(&self, id: &Ulid) -> Option<SharedCounselorState> {
        self.counselors.get(id).map(|e| e.value().clone())
    }

    pub fn counselor_for_appointment(&self, appointment_id: &Ulid) -> Option<Ulid> {
        self.appointment_to_counselor
            .get(appointment_id)
            .map(|e| *e.value())
    }

    /// WAL-append + apply in one call.
    pub(super) async fn persist_and_apply(
        &self,
        cs: &mut CounselorState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_counselor(cs, event, self.indexes());
        Ok(())
    }

    fn indexes(&self) -> Indexes<'_> {
        Indexes {
            appointments: &self.appointment_to_counselor,
            notes: &self.note_to_counselor,
        }
    }

    pub fn counselor_for_session_note(&self, note_id: &Ulid) -> Option<Ulid> {
        self.note_to_counselor.get(note_id).map(|e| *e.value())
    }

    /// Lookup appointment → counselor, acquire that counselor's write lock.
    pub(super) async fn resolve_appointment_write(
        &self,
        appointment_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<CounselorState>, EngineError> {
        let counselor_id = self
            .counselor_for_appointment(appointment_id)
            .ok_or(EngineError::NotFound(*appointment_id))?;
        let cs = self
            .get_counselor(&counselor_id)
            .ok_or(EngineError::NotFound(counselor_id))?;
        let guard = cs.write_owned().await;
        // The appointment may have been deleted while we waited for the lock.
        if guard.appointment(*appointment_id).is_none() {
            return Err(EngineError::NotFound(*appointment_id));
        }
        Ok(guard)
    }

    /// Lookup session note → counselor, acquire that counselor's write lock.
    pub(super) async fn resolve_session_note_write(
        &self,
        note_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<CounselorState>, EngineError> {
        let counselor_id = self
            .counselor_for_session_note(note_id)
            .ok_or(EngineError::NotFound(*note_id))?;
        let cs = self
            .get_counselor(&counselor_id)
            .ok_or(EngineError::NotFound(*note_id))?;
        let guard = cs.write_owned().await;
        if guard.session_note(*note_id).is_none() {
            return Err(EngineError::NotFound(*note_id));
        }
        Ok(guard)
    }

    /// Snapshot every counselor handle without holding DashMap shards across awaits.
    pub(super) fn counselor_handles(&self) -> Vec<SharedCounselorState> {
        self.counselors.iter().map(|e| e.value().clone()).collect()
    }
}
