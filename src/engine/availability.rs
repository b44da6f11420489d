use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use ulid::Ulid;

use crate::limits::MAX_QUERY_DAYS;
use crate::model::{ClassType, Span, TutorSchedule};

use super::conflict::{resolve_local, session_span};
use super::{Engine, EngineError};

/// One still-open slot on a specific date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenSlot {
    pub time: NaiveTime,
    pub timezone: Tz,
}

/// Availability record for a single calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub day_name: String,
    pub month_name: String,
    pub is_past: bool,
    pub available_slots: Vec<OpenSlot>,
}

/// Lazy, finite iterator of per-day availability records over an inclusive
/// date range.
///
/// Works on a snapshot taken under a single read lock at query time, so it
/// never blocks writers while being consumed. Results are advisory — the
/// admission re-check in `request_booking` is authoritative.
pub struct Availability {
    schedule: TutorSchedule,
    class_type: ClassType,
    /// Active booking intervals around the query window.
    booked: Vec<Span>,
    now: DateTime<Utc>,
    cursor: NaiveDate,
    remaining: i64,
}

impl Iterator for Availability {
    type Item = DayAvailability;

    fn next(&mut self) -> Option<DayAvailability> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let date = self.cursor;
        match date.succ_opt() {
            Some(next) => self.cursor = next,
            None => self.remaining = 0, // calendar overflow
        }
        Some(day_availability(
            &self.schedule,
            self.class_type,
            date,
            &self.booked,
            self.now,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}

/// Compute the open slots for one calendar day: recurring slots for the
/// weekday, minus anything overlapping an active booking, minus anything
/// whose start is not strictly in the future.
pub(super) fn day_availability(
    schedule: &TutorSchedule,
    class_type: ClassType,
    date: NaiveDate,
    booked: &[Span],
    now: DateTime<Utc>,
) -> DayAvailability {
    let today = now.with_timezone(&schedule.timezone).date_naive();

    let mut resolved: Vec<(DateTime<Utc>, OpenSlot)> = Vec::new();
    for slot in schedule.slots_for(date.weekday(), class_type) {
        // A wall-clock time erased by a DST spring-forward doesn't happen on
        // that date; ambiguous fall-back times resolve to their first pass.
        let Some(start) = resolve_local(date, slot.time, slot.timezone) else {
            continue;
        };
        let span = session_span(start, slot.duration_minutes);
        if booked.iter().any(|b| b.overlaps(&span)) {
            continue;
        }
        // Same-day cutoff: never offer a slot whose start has already passed.
        if start <= now {
            continue;
        }
        resolved.push((
            start,
            OpenSlot {
                time: slot.time,
                timezone: slot.timezone,
            },
        ));
    }

    // Stable sort, then drop duplicate start instants keeping the first
    // configured occurrence.
    resolved.sort_by_key(|(start, _)| *start);
    resolved.dedup_by(|a, b| a.0 == b.0);

    DayAvailability {
        date,
        day_name: date.format("%A").to_string(),
        month_name: date.format("%B").to_string(),
        is_past: date < today,
        available_slots: resolved.into_iter().map(|(_, slot)| slot).collect(),
    }
}

impl Engine {
    /// Per-day availability for a tutor over the inclusive range
    /// `[start, end]`. Read-only; takes one read lock to snapshot the
    /// schedule and active bookings, then computes lazily.
    pub async fn availability(
        &self,
        tutor_id: Ulid,
        class_type: ClassType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Availability, EngineError> {
        if end < start {
            return Err(EngineError::Validation("date range end before start"));
        }
        let days = (end - start).num_days() + 1;
        if days > MAX_QUERY_DAYS {
            return Err(EngineError::Validation("date range too wide"));
        }
        metrics::counter!(crate::observability::AVAILABILITY_QUERIES_TOTAL).increment(1);

        let now = self.now();
        let (schedule, booked) = match self.tutor_state(&tutor_id) {
            Some(state) => {
                let guard = state.read().await;
                // Pad the window a day each way — a booking's UTC interval
                // can cross the local calendar-date boundary.
                let win_start = start
                    .pred_opt()
                    .unwrap_or(start)
                    .and_time(NaiveTime::MIN)
                    .and_utc();
                let win_end = end
                    .succ_opt()
                    .and_then(|d| d.succ_opt())
                    .unwrap_or(end)
                    .and_time(NaiveTime::MIN)
                    .and_utc();
                let window = Span::new(win_start, win_end);
                let booked = guard.holding(&window).map(|b| b.span).collect();
                (guard.schedule.clone(), booked)
            }
            // Unknown tutor: every day comes back with an empty slot list.
            None => (TutorSchedule::new(tutor_id, chrono_tz::UTC), Vec::new()),
        };

        Ok(Availability {
            schedule,
            class_type,
            booked,
            now,
            cursor: start,
            remaining: days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScheduleSlot;
    use chrono::{Duration, TimeZone, Timelike, Weekday};
    use proptest::prelude::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn jakarta_schedule(times: &[(u32, u32)]) -> TutorSchedule {
        let mut schedule = TutorSchedule::new(Ulid::new(), chrono_tz::Asia::Jakarta);
        for &(h, m) in times {
            schedule.add_slot(
                Weekday::Mon,
                ClassType::Online,
                ScheduleSlot {
                    time: hm(h, m),
                    timezone: chrono_tz::Asia::Jakarta,
                    duration_minutes: 60,
                },
            );
        }
        schedule
    }

    /// Monday 2024-09-09 in Jakarta (UTC+7, no DST).
    const MONDAY: fn() -> NaiveDate = || NaiveDate::from_ymd_opt(2024, 9, 9).unwrap();

    fn jakarta_instant(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
        chrono_tz::Asia::Jakarta
            .from_local_datetime(&date.and_time(hm(h, m)))
            .unwrap()
            .with_timezone(&Utc)
    }

    fn long_before() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn open_slots_for_plain_monday() {
        let schedule = jakarta_schedule(&[(10, 0), (14, 0)]);
        let day = day_availability(&schedule, ClassType::Online, MONDAY(), &[], long_before());
        assert_eq!(day.day_name, "Monday");
        assert_eq!(day.month_name, "September");
        assert!(!day.is_past);
        let times: Vec<_> = day.available_slots.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![hm(10, 0), hm(14, 0)]);
    }

    #[test]
    fn booked_interval_is_subtracted() {
        let schedule = jakarta_schedule(&[(10, 0), (14, 0)]);
        let booked = vec![Span::new(
            jakarta_instant(MONDAY(), 10, 30),
            jakarta_instant(MONDAY(), 11, 0),
        )];
        let day = day_availability(&schedule, ClassType::Online, MONDAY(), &booked, long_before());
        let times: Vec<_> = day.available_slots.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![hm(14, 0)]); // 10:00–11:00 overlaps the booking
    }

    #[test]
    fn adjacent_booking_does_not_block() {
        let schedule = jakarta_schedule(&[(10, 0)]);
        let booked = vec![Span::new(
            jakarta_instant(MONDAY(), 11, 0),
            jakarta_instant(MONDAY(), 12, 0),
        )];
        let day = day_availability(&schedule, ClassType::Online, MONDAY(), &booked, long_before());
        assert_eq!(day.available_slots.len(), 1);
    }

    #[test]
    fn same_day_cutoff_drops_passed_slots() {
        let schedule = jakarta_schedule(&[(10, 0), (14, 0)]);
        // 10:05 local on the queried Monday
        let now = jakarta_instant(MONDAY(), 10, 5);
        let day = day_availability(&schedule, ClassType::Online, MONDAY(), &[], now);
        let times: Vec<_> = day.available_slots.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![hm(14, 0)]);
        assert!(!day.is_past);
    }

    #[test]
    fn past_day_is_flagged_and_empty() {
        let schedule = jakarta_schedule(&[(10, 0)]);
        let now = jakarta_instant(NaiveDate::from_ymd_opt(2024, 9, 10).unwrap(), 9, 0);
        let day = day_availability(&schedule, ClassType::Online, MONDAY(), &[], now);
        assert!(day.is_past);
        assert!(day.available_slots.is_empty());
    }

    #[test]
    fn duplicate_slots_dedup_keeps_first_sorted_ascending() {
        let schedule = jakarta_schedule(&[(14, 0), (10, 0), (10, 0)]);
        let day = day_availability(&schedule, ClassType::Online, MONDAY(), &[], long_before());
        let times: Vec<_> = day.available_slots.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![hm(10, 0), hm(14, 0)]);
    }

    #[test]
    fn other_class_type_and_weekday_are_empty() {
        let schedule = jakarta_schedule(&[(10, 0)]);
        let offline =
            day_availability(&schedule, ClassType::Offline, MONDAY(), &[], long_before());
        assert!(offline.available_slots.is_empty());

        let tuesday = MONDAY().succ_opt().unwrap();
        let day = day_availability(&schedule, ClassType::Online, tuesday, &[], long_before());
        assert!(day.available_slots.is_empty());
        assert_eq!(day.day_name, "Tuesday");
    }

    #[test]
    fn dst_gap_slot_is_skipped() {
        // US spring-forward: 2024-03-10 (a Sunday) has no 02:30 in New York.
        let mut schedule = TutorSchedule::new(Ulid::new(), chrono_tz::America::New_York);
        schedule.add_slot(
            Weekday::Sun,
            ClassType::Online,
            ScheduleSlot {
                time: hm(2, 30),
                timezone: chrono_tz::America::New_York,
                duration_minutes: 60,
            },
        );
        let gap_day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        let day = day_availability(&schedule, ClassType::Online, gap_day, &[], now);
        assert!(day.available_slots.is_empty());

        // The same recurring slot exists again the following Sunday.
        let next_sunday = NaiveDate::from_ymd_opt(2024, 3, 17).unwrap();
        let day = day_availability(&schedule, ClassType::Online, next_sunday, &[], now);
        assert_eq!(day.available_slots.len(), 1);
    }

    #[test]
    fn dst_ambiguous_slot_offered_once() {
        // US fall-back: 2024-11-03 (a Sunday) has two 01:30s in New York.
        let mut schedule = TutorSchedule::new(Ulid::new(), chrono_tz::America::New_York);
        schedule.add_slot(
            Weekday::Sun,
            ClassType::Online,
            ScheduleSlot {
                time: hm(1, 30),
                timezone: chrono_tz::America::New_York,
                duration_minutes: 60,
            },
        );
        let fold_day = NaiveDate::from_ymd_opt(2024, 11, 3).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();

        let day = day_availability(&schedule, ClassType::Online, fold_day, &[], now);
        assert_eq!(day.available_slots.len(), 1);
    }

    proptest! {
        /// Whatever is already booked, availability never offers a slot
        /// overlapping it.
        #[test]
        fn never_offers_booked_interval(
            bookings in prop::collection::vec((0u32..23, 1u32..4), 0..8)
        ) {
            let schedule = jakarta_schedule(
                &(0..24).map(|h| (h, 0)).collect::<Vec<_>>()
            );
            let booked: Vec<Span> = bookings
                .iter()
                .map(|&(h, len_h)| {
                    let start = jakarta_instant(MONDAY(), h, 0);
                    Span::new(start, start + Duration::hours(len_h as i64))
                })
                .collect();

            let day = day_availability(
                &schedule, ClassType::Online, MONDAY(), &booked, long_before(),
            );
            for slot in &day.available_slots {
                let start = jakarta_instant(MONDAY(), slot.time.hour(), 0);
                let span = Span::new(start, start + Duration::hours(1));
                prop_assert!(!booked.iter().any(|b| b.overlaps(&span)));
            }
        }
    }
}
