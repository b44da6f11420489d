use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use ulid::Ulid;

use crate::limits::*;
use crate::model::{Booking, BookingEvent, BookingStatus, ClassType, TutorSchedule};

use super::conflict::{check_no_conflict, validate_request};
use super::{Engine, EngineError};

/// A booking request as submitted by a student.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub tutor_id: Ulid,
    pub student_id: Ulid,
    pub course_id: Ulid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub timezone: Tz,
    pub class_type: ClassType,
    pub duration_minutes: u32,
    pub notes_student: Option<String>,
}

/// The tutor's answer to a pending booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingDecision {
    Accept,
    Decline,
}

impl Engine {
    /// Replace a tutor's recurring schedule. This is the write-through entry
    /// point for the external profile-management collaborator; the engine
    /// itself never edits schedules.
    pub async fn set_schedule(&self, schedule: TutorSchedule) -> Result<(), EngineError> {
        let state = self.tutor_entry(schedule.tutor_id);
        let mut guard = state.write_owned().await;
        let event = BookingEvent::ScheduleSet {
            tutor_id: schedule.tutor_id,
            schedule,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);
        self.emit(&event);
        Ok(())
    }

    /// Admit a new booking request.
    ///
    /// Validation runs before the lock; the overlap re-check runs inside the
    /// tutor's critical section and is authoritative — of N concurrent
    /// requests for the same slot exactly one gets past it.
    pub async fn request_booking(&self, req: BookingRequest) -> Result<Booking, EngineError> {
        let now = self.now();
        let span = validate_request(&req, now)?;

        let state = self.tutor_entry(req.tutor_id);
        let mut guard = state.write_owned().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_TUTOR {
            return Err(EngineError::Validation("too many bookings for tutor"));
        }

        if let Err(e) = check_no_conflict(&guard, &span) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        // A pending booking dies either TTL after creation or just before the
        // session itself starts, whichever comes first.
        let expires_at = (now + self.config().pending_ttl)
            .min(span.start - self.config().expiry_buffer);

        let booking = Booking {
            id: Ulid::new(),
            tutor_id: req.tutor_id,
            student_id: req.student_id,
            course_id: req.course_id,
            date: req.date,
            time: req.time,
            timezone: req.timezone,
            class_type: req.class_type,
            duration_minutes: req.duration_minutes,
            span,
            status: BookingStatus::Pending,
            notes_student: req.notes_student,
            notes_tutor: None,
            decline_reason: None,
            created_at: now,
            expires_at: Some(expires_at),
            updated_at: now,
        };

        let event = BookingEvent::Created {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);

        metrics::counter!(crate::observability::BOOKINGS_REQUESTED_TOTAL).increment(1);
        self.emit(&event);
        Ok(booking)
    }

    /// Accept or decline a pending booking. Only the owning tutor may respond,
    /// and only while the booking is still pending. The optional note is
    /// stored as the tutor's notes on accept and as the decline reason on
    /// decline.
    pub async fn respond_to_booking(
        &self,
        booking_id: Ulid,
        actor_id: Ulid,
        decision: BookingDecision,
        note: Option<String>,
    ) -> Result<Booking, EngineError> {
        if let Some(ref n) = note {
            let too_long = match decision {
                BookingDecision::Accept => n.len() > MAX_NOTE_LEN,
                BookingDecision::Decline => n.len() > MAX_REASON_LEN,
            };
            if too_long {
                return Err(EngineError::Validation("response note too long"));
            }
        }

        let now = self.now();
        let (tutor_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.tutor_id != actor_id {
            return Err(EngineError::Unauthorized(actor_id));
        }
        let action = match decision {
            BookingDecision::Accept => "accept",
            BookingDecision::Decline => "decline",
        };
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::InvalidTransition {
                booking: booking_id,
                from: booking.status,
                action,
            });
        }

        let event = match decision {
            BookingDecision::Accept => BookingEvent::Accepted {
                id: booking_id,
                tutor_id,
                note,
                at: now,
            },
            BookingDecision::Decline => BookingEvent::Declined {
                id: booking_id,
                tutor_id,
                reason: note,
                at: now,
            },
        };
        self.persist_and_apply(&mut guard, &event).await?;
        let updated = guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        drop(guard);

        metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "action" => action)
            .increment(1);
        self.emit(&event);
        Ok(updated)
    }

    /// Cancel a pending or accepted booking. Either party may cancel, but
    /// only strictly before the session starts.
    pub async fn cancel_booking(
        &self,
        booking_id: Ulid,
        actor_id: Ulid,
    ) -> Result<Booking, EngineError> {
        let now = self.now();
        let (tutor_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if actor_id != booking.tutor_id && actor_id != booking.student_id {
            return Err(EngineError::Unauthorized(actor_id));
        }
        if !booking.status.can_transition_to(BookingStatus::Cancelled) || now >= booking.span.start
        {
            return Err(EngineError::InvalidTransition {
                booking: booking_id,
                from: booking.status,
                action: "cancel",
            });
        }

        let event = BookingEvent::Cancelled {
            id: booking_id,
            tutor_id,
            cancelled_by: actor_id,
            at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        let updated = guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        drop(guard);

        metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "action" => "cancel")
            .increment(1);
        self.emit(&event);
        Ok(updated)
    }

    /// Mark an accepted booking completed. System-invoked once the session
    /// end has elapsed; never valid from any other status.
    pub async fn complete_booking(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let now = self.now();
        let (tutor_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.status != BookingStatus::Accepted || now < booking.span.end {
            return Err(EngineError::InvalidTransition {
                booking: booking_id,
                from: booking.status,
                action: "complete",
            });
        }

        let event = BookingEvent::Completed {
            id: booking_id,
            tutor_id,
            at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        let updated = guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        drop(guard);

        metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "action" => "complete")
            .increment(1);
        self.emit(&event);
        Ok(updated)
    }

    /// Expire an overdue pending booking. Goes through the same critical
    /// section as every other transition; a booking that already left
    /// `pending` is skipped (`Ok(None)`), not an error, so the sweeper and
    /// lazy reads can race each other safely.
    pub(crate) async fn expire_booking(
        &self,
        booking_id: Ulid,
    ) -> Result<Option<Booking>, EngineError> {
        let now = self.now();
        let (tutor_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.status != BookingStatus::Pending {
            return Ok(None);
        }
        let overdue = booking.expires_at.is_some_and(|exp| exp <= now);
        if !overdue {
            return Ok(None);
        }

        let event = BookingEvent::Expired {
            id: booking_id,
            tutor_id,
            at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        let updated = guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        drop(guard);

        metrics::counter!(crate::observability::BOOKINGS_EXPIRED_TOTAL).increment(1);
        self.emit(&event);
        Ok(Some(updated))
    }

    /// Snapshot of pending bookings whose expiry deadline has passed.
    /// Non-blocking reads only; a tutor whose lock is contended is picked up
    /// on the next sweep.
    pub(crate) fn collect_expired(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Vec<(Ulid, Ulid)> {
        let mut expired = Vec::new();
        for entry in self.state.iter() {
            let state = entry.value().clone();
            if let Ok(guard) = state.try_read() {
                for b in &guard.bookings {
                    if b.status == BookingStatus::Pending
                        && let Some(exp) = b.expires_at
                        && exp <= now
                    {
                        expired.push((b.id, guard.tutor_id));
                    }
                }
            }
        }
        expired
    }
}
