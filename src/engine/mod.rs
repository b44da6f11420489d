mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{Availability, DayAvailability, OpenSlot};
pub use error::EngineError;
pub use mutations::{BookingDecision, BookingRequest};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::model::{BookingEvent, BookingStatus, TutorState};
use crate::notify::EventSink;
use crate::wal::Wal;

pub type SharedTutorState = Arc<RwLock<TutorState>>;

/// The booking & availability engine. Sole writer of booking state.
///
/// Each tutor's state lives behind its own `RwLock`; every mutation acquires
/// that tutor's write lock around the read-check-write sequence, which is
/// what makes concurrent admissions for the same slot resolve to exactly one
/// winner. Event emission happens after the lock is released.
pub struct Engine {
    state: DashMap<Ulid, SharedTutorState>,
    wal: Mutex<Wal>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    /// Reverse lookup: booking id → tutor id
    booking_to_tutor: DashMap<Ulid, Ulid>,
}

/// Apply an event directly to a TutorState (no locking — caller holds the lock).
fn apply_event(state: &mut TutorState, event: &BookingEvent, index: &DashMap<Ulid, Ulid>) {
    match event {
        BookingEvent::ScheduleSet { schedule, .. } => {
            state.schedule = schedule.clone();
        }
        BookingEvent::Created { booking } => {
            index.insert(booking.id, booking.tutor_id);
            state.insert_booking(booking.clone());
        }
        BookingEvent::Accepted { id, note, at, .. } => {
            if let Some(b) = state.booking_mut(id) {
                b.status = BookingStatus::Accepted;
                // Accepted bookings never auto-expire
                b.expires_at = None;
                if note.is_some() {
                    b.notes_tutor = note.clone();
                }
                b.updated_at = *at;
            }
        }
        BookingEvent::Declined { id, reason, at, .. } => {
            if let Some(b) = state.booking_mut(id) {
                b.status = BookingStatus::Declined;
                b.decline_reason = reason.clone();
                b.updated_at = *at;
            }
        }
        BookingEvent::Cancelled { id, at, .. } => {
            if let Some(b) = state.booking_mut(id) {
                b.status = BookingStatus::Cancelled;
                b.updated_at = *at;
            }
        }
        BookingEvent::Expired { id, at, .. } => {
            if let Some(b) = state.booking_mut(id) {
                b.status = BookingStatus::Expired;
                b.updated_at = *at;
            }
        }
        BookingEvent::Completed { id, at, .. } => {
            if let Some(b) = state.booking_mut(id) {
                b.status = BookingStatus::Completed;
                b.updated_at = *at;
            }
        }
    }
}

impl Engine {
    /// Open the engine with the system clock and default configuration.
    pub fn new(wal_path: PathBuf, sink: Arc<dyn EventSink>) -> io::Result<Self> {
        Self::open(wal_path, sink, Arc::new(SystemClock), EngineConfig::default())
    }

    /// Open the engine, replaying the WAL to rebuild every tutor's state.
    pub fn open(
        wal_path: PathBuf,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;

        let engine = Self {
            state: DashMap::new(),
            wal: Mutex::new(wal),
            sink,
            clock,
            config,
            booking_to_tutor: DashMap::new(),
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly (no contention). Never use blocking_write here
        // because open() may run inside an async context.
        for event in &events {
            let state = engine.tutor_entry(event.tutor_id());
            let mut guard = state.try_write().expect("replay: uncontended write");
            apply_event(&mut guard, event, &engine.booking_to_tutor);
        }

        tracing::info!(
            tutors = engine.state.len(),
            events = events.len(),
            "engine opened"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Get or lazily create the shared state for a tutor.
    pub(super) fn tutor_entry(&self, tutor_id: Ulid) -> SharedTutorState {
        self.state
            .entry(tutor_id)
            .or_insert_with(|| Arc::new(RwLock::new(TutorState::new(tutor_id))))
            .value()
            .clone()
    }

    pub(super) fn tutor_state(&self, tutor_id: &Ulid) -> Option<SharedTutorState> {
        self.state.get(tutor_id).map(|e| e.value().clone())
    }

    /// Append an event to the WAL. The booking mutation fails if this does.
    async fn wal_append(&self, event: &BookingEvent) -> Result<(), EngineError> {
        let mut wal = self.wal.lock().await;
        wal.append(event).map_err(|e| EngineError::Wal(e.to_string()))
    }

    /// WAL-append + apply in one call, inside the caller's critical section.
    /// Emission is deliberately NOT part of this: callers drop the tutor lock
    /// first and then hand the event to the sink.
    pub(super) async fn persist_and_apply(
        &self,
        state: &mut TutorState,
        event: &BookingEvent,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_event(state, event, &self.booking_to_tutor);
        Ok(())
    }

    pub(super) fn emit(&self, event: &BookingEvent) {
        self.sink.emit(event);
    }

    /// Lookup booking → tutor, get tutor state, acquire its write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<TutorState>), EngineError> {
        let tutor_id = self
            .booking_to_tutor
            .get(booking_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*booking_id))?;
        let state = self
            .tutor_state(&tutor_id)
            .ok_or(EngineError::NotFound(tutor_id))?;
        let guard = state.write_owned().await;
        Ok((tutor_id, guard))
    }

    /// Rewrite the WAL with the minimal event set recreating current state:
    /// one schedule per tutor plus one snapshot per retained booking.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        for entry in self.state.iter() {
            let state = entry.value().clone();
            let guard = state.read().await;
            if !guard.schedule.is_empty() {
                events.push(BookingEvent::ScheduleSet {
                    tutor_id: guard.tutor_id,
                    schedule: guard.schedule.clone(),
                });
            }
            for booking in &guard.bookings {
                events.push(BookingEvent::Created {
                    booking: booking.clone(),
                });
            }
        }

        let mut wal = self.wal.lock().await;
        wal.compact(&events)
            .map_err(|e| EngineError::Wal(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.wal.lock().await.appends_since_compact()
    }
}
