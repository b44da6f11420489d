use ulid::Ulid;

use crate::model::{Booking, BookingStatus, TutorSchedule};

use super::{Engine, EngineError};

impl Engine {
    /// Fetch a booking by id.
    ///
    /// Reads expire lazily: an overdue pending booking is transitioned to
    /// `expired` (through the normal lifecycle path, sweep-race safe) before
    /// being returned, so callers observe expiry deterministically from
    /// `expires_at` onward even between sweeper ticks.
    pub async fn get_booking(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let tutor_id = self
            .booking_to_tutor
            .get(&booking_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(booking_id))?;
        let state = self
            .tutor_state(&tutor_id)
            .ok_or(EngineError::NotFound(tutor_id))?;

        let overdue = {
            let guard = state.read().await;
            let booking = guard
                .booking(&booking_id)
                .ok_or(EngineError::NotFound(booking_id))?;
            let overdue = booking.status == BookingStatus::Pending
                && booking.expires_at.is_some_and(|exp| exp <= self.now());
            if !overdue {
                return Ok(booking.clone());
            }
            overdue
        };
        debug_assert!(overdue);

        if let Some(expired) = self.expire_booking(booking_id).await? {
            return Ok(expired);
        }
        // Lost the race to another transition — re-read the final state.
        let guard = state.read().await;
        guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    /// All bookings for a tutor, active and terminal, ordered by session start.
    pub async fn bookings_for_tutor(&self, tutor_id: Ulid) -> Vec<Booking> {
        match self.tutor_state(&tutor_id) {
            Some(state) => state.read().await.bookings.clone(),
            None => Vec::new(),
        }
    }

    /// A tutor's current recurring schedule, if one has been set.
    pub async fn schedule_for(&self, tutor_id: Ulid) -> Option<TutorSchedule> {
        let state = self.tutor_state(&tutor_id)?;
        let guard = state.read().await;
        if guard.schedule.is_empty() {
            None
        } else {
            Some(guard.schedule.clone())
        }
    }
}
