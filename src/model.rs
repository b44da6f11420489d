use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open interval `[start, end)` of timezone-normalized instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Span {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// Delivery mode of a lesson. Each mode has its own recurring schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassType {
    Online,
    Offline,
}

impl ClassType {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassType::Online => "online",
            ClassType::Offline => "offline",
        }
    }

    /// Parse a class type from its wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(ClassType::Online),
            "offline" => Some(ClassType::Offline),
            _ => None,
        }
    }
}

/// Booking lifecycle status. Closed set — transitions go through
/// [`BookingStatus::can_transition_to`], nothing re-enters `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Declined => "declined",
            BookingStatus::Expired => "expired",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// A booking in an active status holds its slot against new admissions.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Accepted)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// The transition table:
    /// `pending → {accepted, declined, expired, cancelled}`,
    /// `accepted → {completed, cancelled}`, terminal states go nowhere.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Declined)
                | (Pending, Expired)
                | (Pending, Cancelled)
                | (Accepted, Completed)
                | (Accepted, Cancelled)
        )
    }
}

/// One lesson booking. Never physically deleted — terminal bookings are
/// retained for history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub tutor_id: Ulid,
    pub student_id: Ulid,
    pub course_id: Ulid,
    /// Wall-clock schedule as the student requested it.
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub timezone: Tz,
    pub class_type: ClassType,
    pub duration_minutes: u32,
    /// The timezone-normalized session interval, resolved once at admission.
    pub span: Span,
    pub status: BookingStatus,
    pub notes_student: Option<String>,
    /// Set from the note the tutor attaches when accepting.
    pub notes_tutor: Option<String>,
    pub decline_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When a pending booking auto-expires. Cleared on accept.
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn session_start(&self) -> DateTime<Utc> {
        self.span.start
    }

    pub fn session_end(&self) -> DateTime<Utc> {
        self.span.end
    }

    /// True while this booking blocks its interval for other requests.
    pub fn holds_slot(&self) -> bool {
        self.status.is_active()
    }
}

/// One recurring weekly slot: local wall-clock start + its timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub time: NaiveTime,
    pub timezone: Tz,
    pub duration_minutes: u32,
}

/// A tutor's weekly recurring availability template, keyed by
/// (day-of-week, class type). Owned by the tutor; the engine only reads it
/// (and persists replacements arriving from the profile collaborator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorSchedule {
    pub tutor_id: Ulid,
    /// Home timezone — drives "today" and the same-day cutoff.
    pub timezone: Tz,
    slots: HashMap<(Weekday, ClassType), Vec<ScheduleSlot>>,
}

impl TutorSchedule {
    pub fn new(tutor_id: Ulid, timezone: Tz) -> Self {
        Self {
            tutor_id,
            timezone,
            slots: HashMap::new(),
        }
    }

    /// Append a slot, preserving the tutor's configured order.
    pub fn add_slot(&mut self, day: Weekday, class_type: ClassType, slot: ScheduleSlot) {
        self.slots.entry((day, class_type)).or_default().push(slot);
    }

    /// Recurring slots for a (day, class type) pair, in insertion order.
    /// Unknown pairs yield an empty slice.
    pub fn slots_for(&self, day: Weekday, class_type: ClassType) -> &[ScheduleSlot] {
        self.slots
            .get(&(day, class_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.slots.values().all(Vec::is_empty)
    }
}

/// Everything the engine tracks for one tutor. This is the unit of locking:
/// all admission checks and status transitions happen under this state's
/// exclusive write lock.
#[derive(Debug, Clone)]
pub struct TutorState {
    pub tutor_id: Ulid,
    pub schedule: TutorSchedule,
    /// All bookings, active and terminal, sorted by `span.start`.
    pub bookings: Vec<Booking>,
}

impl TutorState {
    pub fn new(tutor_id: Ulid) -> Self {
        Self {
            tutor_id,
            schedule: TutorSchedule::new(tutor_id, chrono_tz::UTC),
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by session start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == *id)
    }

    /// Active bookings whose interval overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn holding(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.holds_slot() && b.span.end > query.start)
    }
}

/// Booking lifecycle events — the WAL record format and the payload handed
/// to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingEvent {
    ScheduleSet {
        tutor_id: Ulid,
        schedule: TutorSchedule,
    },
    Created {
        booking: Booking,
    },
    Accepted {
        id: Ulid,
        tutor_id: Ulid,
        note: Option<String>,
        at: DateTime<Utc>,
    },
    Declined {
        id: Ulid,
        tutor_id: Ulid,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
    Cancelled {
        id: Ulid,
        tutor_id: Ulid,
        cancelled_by: Ulid,
        at: DateTime<Utc>,
    },
    Expired {
        id: Ulid,
        tutor_id: Ulid,
        at: DateTime<Utc>,
    },
    Completed {
        id: Ulid,
        tutor_id: Ulid,
        at: DateTime<Utc>,
    },
}

impl BookingEvent {
    /// The event name delivered to the notification collaborator.
    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::ScheduleSet { .. } => "schedule.set",
            BookingEvent::Created { .. } => "booking.created",
            BookingEvent::Accepted { .. } => "booking.accepted",
            BookingEvent::Declined { .. } => "booking.declined",
            BookingEvent::Cancelled { .. } => "booking.cancelled",
            BookingEvent::Expired { .. } => "booking.expired",
            BookingEvent::Completed { .. } => "booking.completed",
        }
    }

    pub fn tutor_id(&self) -> Ulid {
        match self {
            BookingEvent::ScheduleSet { tutor_id, .. } => *tutor_id,
            BookingEvent::Created { booking } => booking.tutor_id,
            BookingEvent::Accepted { tutor_id, .. }
            | BookingEvent::Declined { tutor_id, .. }
            | BookingEvent::Cancelled { tutor_id, .. }
            | BookingEvent::Expired { tutor_id, .. }
            | BookingEvent::Completed { tutor_id, .. } => *tutor_id,
        }
    }

    pub fn booking_id(&self) -> Option<Ulid> {
        match self {
            BookingEvent::ScheduleSet { .. } => None,
            BookingEvent::Created { booking } => Some(booking.id),
            BookingEvent::Accepted { id, .. }
            | BookingEvent::Declined { id, .. }
            | BookingEvent::Cancelled { id, .. }
            | BookingEvent::Expired { id, .. }
            | BookingEvent::Completed { id, .. } => Some(*id),
        }
    }

    /// JSON payload for sinks that forward events to external systems.
    pub fn payload(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "event": self.name(),
            "tutor_id": self.tutor_id().to_string(),
        });
        if let Some(id) = self.booking_id() {
            value["booking_id"] = serde_json::Value::String(id.to_string());
        }
        match self {
            BookingEvent::Created { booking } => {
                value["student_id"] = serde_json::Value::String(booking.student_id.to_string());
                value["status"] = serde_json::Value::String(booking.status.as_str().into());
            }
            BookingEvent::Accepted { note: Some(note), .. } => {
                value["note"] = serde_json::Value::String(note.clone());
            }
            BookingEvent::Declined { reason: Some(reason), .. } => {
                value["reason"] = serde_json::Value::String(reason.clone());
            }
            BookingEvent::Cancelled { cancelled_by, .. } => {
                value["cancelled_by"] = serde_json::Value::String(cancelled_by.to_string());
            }
            _ => {}
        }
        value
    }
}
