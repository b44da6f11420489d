//! slotbook — the booking & availability engine for a tutoring platform.
//!
//! Computes bookable slots from recurring weekly schedules, admits booking
//! requests under a per-tutor critical section (no double-booking), and
//! drives bookings through an explicit lifecycle with automatic expiry.
//! Library-level contract: clock, persistence and notification delivery are
//! injectable collaborators.

pub mod clock;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod sweeper;
pub mod wal;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{
    Availability, BookingDecision, BookingRequest, DayAvailability, Engine, EngineError, OpenSlot,
};
pub use model::{
    Booking, BookingEvent, BookingStatus, ClassType, ScheduleSlot, Span, TutorSchedule,
};
pub use notify::{EventSink, NotifyHub};
