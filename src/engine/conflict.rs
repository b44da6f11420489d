use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::limits::*;
use crate::model::{Span, TutorState};

use super::mutations::BookingRequest;
use super::EngineError;

/// Resolve a local (date, time) in `tz` to a UTC instant.
///
/// A wall-clock time skipped by a DST spring-forward does not exist and
/// yields `None`. An ambiguous time during a DST fall-back resolves to its
/// earliest occurrence.
pub(super) fn resolve_local(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

pub(super) fn session_span(start: DateTime<Utc>, duration_minutes: u32) -> Span {
    Span::new(start, start + Duration::minutes(duration_minutes as i64))
}

/// Synchronous input validation — runs before any lock is taken.
/// Returns the resolved session interval.
pub(super) fn validate_request(
    req: &BookingRequest,
    now: DateTime<Utc>,
) -> Result<Span, EngineError> {
    if req.duration_minutes == 0 {
        return Err(EngineError::Validation("duration must be positive"));
    }
    if req.duration_minutes > MAX_DURATION_MINUTES {
        return Err(EngineError::Validation("duration too long"));
    }
    if let Some(ref notes) = req.notes_student
        && notes.len() > MAX_NOTE_LEN {
            return Err(EngineError::Validation("student notes too long"));
        }

    let start = resolve_local(req.date, req.time, req.timezone).ok_or(
        EngineError::Validation("requested time does not exist in this timezone (DST gap)"),
    )?;
    if start <= now {
        return Err(EngineError::Validation("slot start is already in the past"));
    }

    Ok(session_span(start, req.duration_minutes))
}

/// The authoritative overlap check, run under the tutor's write lock.
/// Any active (pending or accepted) booking whose interval intersects the
/// candidate span kills the admission.
pub(super) fn check_no_conflict(state: &TutorState, span: &Span) -> Result<(), EngineError> {
    if let Some(existing) = state.holding(span).next() {
        return Err(EngineError::SlotConflict(existing.id));
    }
    Ok(())
}
