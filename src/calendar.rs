//! Calendar aggregation: per-day marks and the agenda for a selected day.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::models::{PrescriptionRecord, ReminderTime};

const SELECTED_DOT_COLOR: &str = "white";

/// Deterministic `#RRGGBB` color for a medication name.
///
/// Classic `hash * 31 + c` string hash over UTF-16 units in 32-bit
/// arithmetic, keeping the low 24 bits.
pub fn medication_color(name: &str) -> String {
    let hash = name.encode_utf16().fold(0i32, |hash, unit| {
        i32::from(unit)
            .wrapping_add(hash.wrapping_shl(5))
            .wrapping_sub(hash)
    });
    format!("#{:06X}", hash & 0x00FF_FFFF)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dot {
    pub key: String,
    pub color: String,
    pub selected_dot_color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayMarks {
    pub marked: bool,
    pub dots: Vec<Dot>,
}

/// Marks keyed by day; serialises with `YYYY-MM-DD` keys.
pub type MarkedDates = BTreeMap<NaiveDate, DayMarks>;

/// One dot per non-archived prescription on every day of its range.
pub fn build_marks(records: &[PrescriptionRecord]) -> MarkedDates {
    let mut marks = MarkedDates::new();
    for record in records.iter().filter(|r| !r.archived) {
        let color = medication_color(&record.name);
        for day in days_of(record) {
            marks
                .entry(day)
                .or_insert_with(|| DayMarks {
                    marked: true,
                    dots: Vec::new(),
                })
                .dots
                .push(Dot {
                    key: record.id.clone(),
                    color: color.clone(),
                    selected_dot_color: SELECTED_DOT_COLOR.to_string(),
                });
        }
    }
    marks
}

/// Every calendar day from the start day to the end day inclusive.
fn days_of(record: &PrescriptionRecord) -> impl Iterator<Item = NaiveDate> {
    let end = record.end_at.date();
    std::iter::successors(Some(record.start_at.date()), |day| {
        day.checked_add_days(Days::new(1))
    })
    .take_while(move |day| *day <= end)
}

// ═══════════════════════════════════════════════════════════
// Day agenda
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Upcoming,
    Taken,
    Missed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaSlot {
    pub time: ReminderTime,
    pub at: NaiveDateTime,
    pub status: SlotStatus,
    /// A taken dose logged outside every reminder slot.
    pub off_schedule: bool,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaEntry {
    pub prescription_id: String,
    pub name: String,
    pub dosage: String,
    pub color: String,
    pub slots: Vec<AgendaSlot>,
}

/// Prescriptions covering `day`, each with its slots for that day.
///
/// Slots are the reminder times plus off-schedule taken doses on that day,
/// ordered by hour then minute.
pub fn day_agenda(records: &[PrescriptionRecord], day: NaiveDate, now: NaiveDateTime) -> Vec<AgendaEntry> {
    records
        .iter()
        .filter(|r| !r.archived && r.covers(day))
        .map(|record| AgendaEntry {
            prescription_id: record.id.clone(),
            name: record.name.clone(),
            dosage: record.dosage.clone(),
            color: medication_color(&record.name),
            slots: day_slots(record, day, now),
        })
        .collect()
}

fn day_slots(record: &PrescriptionRecord, day: NaiveDate, now: NaiveDateTime) -> Vec<AgendaSlot> {
    let scheduled = record.reminder_times.iter().map(|time| (time.clone(), false));
    let off_schedule = record
        .taken
        .iter()
        .filter(|at| at.date() == day)
        .filter(|at| !record.reminder_times.iter().any(|time| time.matches(at)))
        .map(|at| (ReminderTime::from_datetime(at), true));

    let mut slots: Vec<AgendaSlot> = scheduled
        .chain(off_schedule)
        .map(|(time, off_schedule)| {
            let at = time.on(day);
            // Off-schedule slots only exist because a dose was logged.
            let status = if off_schedule || record.taken_at_slot(day, &time) {
                SlotStatus::Taken
            } else if at > now {
                SlotStatus::Upcoming
            } else {
                SlotStatus::Missed
            };
            AgendaSlot {
                display: slot_display(&time),
                time,
                at,
                status,
                off_schedule,
            }
        })
        .collect();

    slots.sort_by_key(|slot| (slot.time.hours, slot.time.minutes));
    slots
}

fn slot_display(time: &ReminderTime) -> String {
    if time.label.is_empty() {
        time.display()
    } else {
        format!("{} ({})", time.label, time.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn record(id: &str, name: &str, start: NaiveDateTime, end: NaiveDateTime) -> PrescriptionRecord {
        let mut r = PrescriptionRecord::new(name, start);
        r.id = id.into();
        r.end_at = end;
        r.reminder_times = vec![
            ReminderTime::new(20, 0, "Dinner").unwrap(),
            ReminderTime::new(8, 0, "").unwrap(),
        ];
        r
    }

    #[test]
    fn color_hash_matches_known_values() {
        assert_eq!(medication_color(""), "#000000");
        assert_eq!(medication_color("A"), "#000041");
        assert_eq!(medication_color("AB"), "#000821");
    }

    #[test]
    fn color_is_stable_and_well_formed() {
        let c = medication_color("Amoxicillin 500mg");
        assert_eq!(c, medication_color("Amoxicillin 500mg"));
        assert_eq!(c.len(), 7);
        assert!(c.starts_with('#'));
        assert!(c[1..].chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_lowercase()));
    }

    #[test]
    fn three_day_range_marks_three_days() {
        let records = vec![record("rx1", "Amoxicillin", at(1, 9, 0), at(3, 9, 0))];
        let marks = build_marks(&records);
        assert_eq!(marks.len(), 3);
        for (day, mark) in &marks {
            assert!(mark.marked);
            assert_eq!(mark.dots.len(), 1, "day {day}");
            assert_eq!(mark.dots[0].key, "rx1");
            assert_eq!(mark.dots[0].selected_dot_color, "white");
        }
        assert!(marks.contains_key(&NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()));
    }

    #[test]
    fn overlapping_prescriptions_share_days() {
        let records = vec![
            record("a", "Amoxicillin", at(1, 9, 0), at(2, 9, 0)),
            record("b", "Ibuprofen", at(2, 9, 0), at(4, 9, 0)),
        ];
        let marks = build_marks(&records);
        assert_eq!(marks.len(), 4);
        let jan2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(marks[&jan2].dots.len(), 2);
    }

    #[test]
    fn archived_records_are_not_marked() {
        let mut r = record("a", "Amoxicillin", at(1, 9, 0), at(2, 9, 0));
        r.archived = true;
        assert!(build_marks(&[r]).is_empty());
    }

    #[test]
    fn marks_serialize_with_date_keys() {
        let marks = build_marks(&[record("a", "A", at(1, 9, 0), at(1, 9, 0))]);
        let json = serde_json::to_value(&marks).unwrap();
        assert_eq!(json["2024-01-01"]["dots"][0]["selectedDotColor"], "white");
    }

    #[test]
    fn agenda_filters_by_day_and_sorts_slots() {
        let records = vec![
            record("a", "Amoxicillin", at(1, 9, 0), at(3, 9, 0)),
            record("b", "Ibuprofen", at(5, 9, 0), at(6, 9, 0)),
        ];
        let agenda = day_agenda(&records, at(2, 0, 0).date(), at(2, 12, 0));
        assert_eq!(agenda.len(), 1);
        let slots = &agenda[0].slots;
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].time.hours, 8);
        assert_eq!(slots[1].display, "Dinner (8:00 PM)");
    }

    #[test]
    fn agenda_statuses_and_off_schedule_doses() {
        let mut r = record("a", "Amoxicillin", at(1, 9, 0), at(3, 9, 0));
        r.taken = vec![at(2, 8, 0), at(2, 11, 30), at(1, 8, 0)];
        let agenda = day_agenda(&[r], at(2, 0, 0).date(), at(2, 12, 0));
        let slots = &agenda[0].slots;

        assert_eq!(slots.len(), 3);
        assert_eq!((slots[0].time.hours, slots[0].status), (8, SlotStatus::Taken));
        assert_eq!(slots[1].time.hours, 11);
        assert!(slots[1].off_schedule);
        assert_eq!(slots[1].status, SlotStatus::Taken);
        assert_eq!((slots[2].time.hours, slots[2].status), (20, SlotStatus::Upcoming));
    }

    #[test]
    fn past_untaken_slots_are_missed() {
        let r = record("a", "Amoxicillin", at(1, 9, 0), at(3, 9, 0));
        let agenda = day_agenda(&[r], at(1, 0, 0).date(), at(2, 12, 0));
        assert!(agenda[0].slots.iter().all(|s| s.status == SlotStatus::Missed));
    }

    #[test]
    fn doses_logged_with_seconds_still_count() {
        let mut r = record("a", "Amoxicillin", at(1, 9, 0), at(3, 9, 0));
        let day = at(2, 0, 0).date();
        r.taken = vec![
            day.and_hms_opt(8, 0, 30).unwrap(),
            day.and_hms_opt(11, 17, 42).unwrap(),
        ];
        let agenda = day_agenda(&[r], day, at(2, 21, 0));
        let slots = &agenda[0].slots;

        assert_eq!(slots.len(), 3);
        assert_eq!((slots[0].time.hours, slots[0].status), (8, SlotStatus::Taken));
        assert!(slots[1].off_schedule);
        assert_eq!((slots[1].time.hours, slots[1].time.minutes), (11, 17));
        assert_eq!(slots[1].status, SlotStatus::Taken);
        assert_eq!((slots[2].time.hours, slots[2].status), (20, SlotStatus::Missed));
    }
}
