use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed input — rejected before any lock is taken.
    Validation(&'static str),
    /// Admission lost the race or the slot is already held; carries the
    /// conflicting booking's id.
    SlotConflict(Ulid),
    /// The requested action is not legal for the booking's current status.
    InvalidTransition {
        booking: Ulid,
        from: BookingStatus,
        action: &'static str,
    },
    /// Unknown booking or tutor.
    NotFound(Ulid),
    /// The actor lacks rights for this action; carries the actor's id.
    Unauthorized(Ulid),
    /// Persistence failed; the mutation did not commit.
    Wal(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::SlotConflict(id) => {
                write!(f, "slot conflict with active booking: {id}")
            }
            EngineError::InvalidTransition {
                booking,
                from,
                action,
            } => write!(
                f,
                "cannot {action} booking {booking}: status is {}",
                from.as_str()
            ),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Unauthorized(actor) => {
                write!(f, "actor {actor} is not authorized for this action")
            }
            EngineError::Wal(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
