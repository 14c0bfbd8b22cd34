//! Adherence Calculator.
//!
//! Pure functions over a record and "now": how many doses were due so far,
//! how many logged doses line up with a reminder slot, and the difference.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::PrescriptionRecord;

/// Reminder slots elapsed between the start day and `min(now, endAt)`.
///
/// Every day before the cutoff day counts all slots; on the cutoff day only
/// slots at or before `now` count.
pub fn doses_due_so_far(record: &PrescriptionRecord, now: NaiveDateTime) -> usize {
    let start_day = record.start_at.date();
    if now.date() < start_day {
        return 0;
    }

    let cutoff_day = now.min(record.end_at).date();
    if cutoff_day < start_day {
        return 0;
    }

    let per_day = record.reminder_times.len();
    let full_days = usize::try_from((cutoff_day - start_day).num_days()).unwrap_or(0);
    let on_cutoff_day = record
        .reminder_times
        .iter()
        .filter(|time| time.on(cutoff_day) <= now)
        .count();

    full_days * per_day + on_cutoff_day
}

/// Taken entries whose time of day matches one of the reminder slots.
pub fn matched_taken_count(record: &PrescriptionRecord) -> usize {
    record
        .taken
        .iter()
        .filter(|at| record.reminder_times.iter().any(|time| time.matches(at)))
        .count()
}

/// Doses due so far that have no matching taken entry. Never negative.
pub fn skipped_so_far(record: &PrescriptionRecord, now: NaiveDateTime) -> usize {
    doses_due_so_far(record, now).saturating_sub(matched_taken_count(record))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdherenceSummary {
    pub prescription_id: String,
    /// Every logged dose, on schedule or not.
    pub taken: usize,
    pub matched_taken: usize,
    pub scheduled_so_far: usize,
    pub skipped_so_far: usize,
}

impl AdherenceSummary {
    pub fn of(record: &PrescriptionRecord, now: NaiveDateTime) -> Self {
        let scheduled_so_far = doses_due_so_far(record, now);
        let matched_taken = matched_taken_count(record);
        Self {
            prescription_id: record.id.clone(),
            taken: record.taken.len(),
            matched_taken,
            scheduled_so_far,
            skipped_so_far: scheduled_so_far.saturating_sub(matched_taken),
        }
    }

    /// Share of due doses logged on schedule, `None` before anything was due.
    pub fn ratio(&self) -> Option<f64> {
        if self.scheduled_so_far == 0 {
            return None;
        }
        Some((self.matched_taken.min(self.scheduled_so_far)) as f64 / self.scheduled_so_far as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReminderTime;
    use chrono::NaiveDate;

    fn at(m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn record(start: NaiveDateTime, end: NaiveDateTime, times: &[(u32, u32)]) -> PrescriptionRecord {
        let mut r = PrescriptionRecord::new("Amoxicillin", start);
        r.end_at = end;
        r.reminder_times = times
            .iter()
            .map(|(h, m)| ReminderTime::new(*h, *m, "").unwrap())
            .collect();
        r
    }

    #[test]
    fn nothing_due_at_start_before_first_slot() {
        let start = at(3, 1, 7, 30);
        let r = record(start, at(3, 5, 7, 30), &[(8, 0), (20, 0)]);
        assert_eq!(doses_due_so_far(&r, start), 0);
    }

    #[test]
    fn nothing_due_before_start_day() {
        let r = record(at(3, 5, 9, 0), at(3, 9, 9, 0), &[(8, 0)]);
        assert_eq!(doses_due_so_far(&r, at(3, 4, 23, 0)), 0);
    }

    #[test]
    fn fully_past_counts_every_slot_of_every_day() {
        let r = record(at(1, 1, 9, 0), at(1, 3, 9, 0), &[(8, 0), (14, 0), (20, 0)]);
        // 3 slots * 3 days, viewed long after the end.
        assert_eq!(doses_due_so_far(&r, at(2, 15, 12, 0)), 9);
        assert_eq!(doses_due_so_far(&r, at(1, 4, 0, 0)), 9);
    }

    #[test]
    fn cutoff_day_counts_only_elapsed_slots() {
        let r = record(at(3, 1, 7, 0), at(3, 10, 7, 0), &[(8, 0), (20, 0)]);
        // Two full days, plus 8:00 on the third.
        assert_eq!(doses_due_so_far(&r, at(3, 3, 12, 0)), 5);
        // A slot exactly at now counts.
        assert_eq!(doses_due_so_far(&r, at(3, 3, 20, 0)), 6);
    }

    #[test]
    fn no_reminder_times_means_nothing_due() {
        let r = record(at(3, 1, 7, 0), at(3, 10, 7, 0), &[]);
        assert_eq!(doses_due_so_far(&r, at(3, 5, 12, 0)), 0);
    }

    #[test]
    fn matched_count_ignores_off_schedule_doses() {
        let mut r = record(at(3, 1, 7, 0), at(3, 10, 7, 0), &[(8, 0), (20, 0)]);
        r.taken = vec![at(3, 1, 8, 0), at(3, 1, 20, 0), at(3, 2, 11, 17)];
        assert_eq!(matched_taken_count(&r), 2);
    }

    #[test]
    fn skipped_is_due_minus_matched() {
        let mut r = record(at(3, 1, 7, 0), at(3, 10, 7, 0), &[(8, 0), (20, 0)]);
        r.taken = vec![at(3, 1, 8, 0), at(3, 2, 8, 0)];
        // Due: 1st 8,20 / 2nd 8,20 / 3rd 8 = 5.
        assert_eq!(skipped_so_far(&r, at(3, 3, 9, 0)), 3);
    }

    #[test]
    fn skipped_saturates_at_zero() {
        let mut r = record(at(3, 1, 7, 0), at(3, 10, 7, 0), &[(8, 0)]);
        // Logged ahead of schedule.
        r.taken = vec![at(3, 1, 8, 0), at(3, 2, 8, 0), at(3, 3, 8, 0)];
        assert_eq!(skipped_so_far(&r, at(3, 1, 9, 0)), 0);
    }

    #[test]
    fn summary_reports_ratio() {
        let mut r = record(at(3, 1, 7, 0), at(3, 10, 7, 0), &[(8, 0), (20, 0)]);
        r.taken = vec![at(3, 1, 8, 0), at(3, 1, 9, 30)];
        let summary = AdherenceSummary::of(&r, at(3, 2, 7, 0));
        assert_eq!(summary.taken, 2);
        assert_eq!(summary.matched_taken, 1);
        assert_eq!(summary.scheduled_so_far, 2);
        assert_eq!(summary.skipped_so_far, 1);
        assert_eq!(summary.ratio(), Some(0.5));

        let fresh = AdherenceSummary::of(&r, at(3, 1, 7, 30));
        assert_eq!(fresh.ratio(), None);
    }
}
