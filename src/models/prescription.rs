use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::ModelError;

/// Timing of a dose relative to meals. Serialised as the integer 0/1/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FoodTiming {
    #[default]
    NoPreference,
    BeforeFood,
    AfterFood,
}

impl FoodTiming {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::NoPreference => 0,
            Self::BeforeFood => 1,
            Self::AfterFood => 2,
        }
    }

    /// Unknown codes fall back to `NoPreference`.
    pub fn from_i64(code: i64) -> Self {
        match code {
            1 => Self::BeforeFood,
            2 => Self::AfterFood,
            _ => Self::NoPreference,
        }
    }
}

impl Serialize for FoodTiming {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for FoodTiming {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        Ok(Self::from_i64(code))
    }
}

/// A daily time of day at which a dose is due.
///
/// Deserialization goes through `ReminderTime::new`, so out-of-range values
/// never load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ReminderTimeFields")]
pub struct ReminderTime {
    pub hours: u32,
    pub minutes: u32,
    #[serde(default)]
    pub label: String,
}

#[derive(Deserialize)]
struct ReminderTimeFields {
    hours: u32,
    minutes: u32,
    #[serde(default)]
    label: String,
}

impl TryFrom<ReminderTimeFields> for ReminderTime {
    type Error = ModelError;

    fn try_from(fields: ReminderTimeFields) -> Result<Self, Self::Error> {
        Self::new(fields.hours, fields.minutes, &fields.label)
    }
}

impl ReminderTime {
    pub fn new(hours: u32, minutes: u32, label: &str) -> Result<Self, ModelError> {
        let time = Self {
            hours,
            minutes,
            label: label.to_string(),
        };
        time.validate()?;
        Ok(time)
    }

    /// Fields are public, so values built in place are checked here.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.hours > 23 || self.minutes > 59 {
            return Err(ModelError::InvalidReminderTime {
                hours: self.hours,
                minutes: self.minutes,
            });
        }
        Ok(())
    }

    /// Reminder time taken from the wall-clock part of a timestamp, unlabeled.
    pub fn from_datetime(at: &NaiveDateTime) -> Self {
        Self {
            hours: at.hour(),
            minutes: at.minute(),
            label: String::new(),
        }
    }

    pub fn time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hours, self.minutes, 0).unwrap_or(NaiveTime::MIN)
    }

    /// The slot's timestamp on a given day.
    pub fn on(&self, day: NaiveDate) -> NaiveDateTime {
        day.and_time(self.time())
    }

    /// Same hour and minute, ignoring the label.
    pub fn same_slot(&self, other: &ReminderTime) -> bool {
        self.hours == other.hours && self.minutes == other.minutes
    }

    pub fn matches(&self, at: &NaiveDateTime) -> bool {
        self.hours == at.hour() && self.minutes == at.minute()
    }

    /// 12-hour display, e.g. `8:05 AM`.
    pub fn display(&self) -> String {
        let hours = match self.hours % 12 {
            0 => 12,
            h => h,
        };
        let suffix = if self.hours >= 12 { "PM" } else { "AM" };
        format!("{hours}:{:02} {suffix}", self.minutes)
    }
}

/// A tracked prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub food: FoodTiming,
    #[serde(default)]
    pub reminder_times: Vec<ReminderTime>,
    #[serde(default)]
    pub taken: Vec<NaiveDateTime>,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    #[serde(default)]
    pub archived: bool,
}

impl PrescriptionRecord {
    /// Blank record starting and ending at `now`, with a fresh id.
    pub fn new(name: &str, now: NaiveDateTime) -> Self {
        Self {
            id: new_prescription_id(),
            name: name.to_string(),
            dosage: String::new(),
            kind: String::new(),
            food: FoodTiming::NoPreference,
            reminder_times: Vec::new(),
            taken: Vec::new(),
            start_at: now,
            end_at: now,
            archived: false,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.start_at > self.end_at {
            return Err(ModelError::InvalidDateRange {
                start: self.start_at,
                end: self.end_at,
            });
        }
        self.reminder_times.iter().try_for_each(ReminderTime::validate)
    }

    /// Expired when the end date is strictly before `today` (day granularity).
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.end_at.date() < today
    }

    /// Whether `day` falls inside `[startAt, endAt]` at day granularity.
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.start_at.date() <= day && day <= self.end_at.date()
    }

    pub fn has_taken(&self, at: &NaiveDateTime) -> bool {
        self.taken.contains(at)
    }

    /// Whether a dose was logged on `day` at the slot's hour and minute.
    pub fn taken_at_slot(&self, day: NaiveDate, time: &ReminderTime) -> bool {
        self.taken.iter().any(|at| at.date() == day && time.matches(at))
    }

    /// Record a dose; returns `false` when the timestamp was already logged.
    pub fn mark_taken(&mut self, at: NaiveDateTime) -> bool {
        if self.has_taken(&at) {
            return false;
        }
        self.taken.push(at);
        true
    }

    /// Flip the dose at `at`'s minute on or off. Returns whether it is now taken.
    ///
    /// Every entry logged within that minute is removed when turning off.
    pub fn toggle_taken(&mut self, at: NaiveDateTime) -> bool {
        let before = self.taken.len();
        self.taken.retain(|t| !same_minute(t, &at));
        if self.taken.len() < before {
            false
        } else {
            self.taken.push(at);
            true
        }
    }

    /// Remove a reminder slot together with every taken entry logged at that slot.
    pub fn remove_reminder_time(&mut self, index: usize) -> Option<ReminderTime> {
        if index >= self.reminder_times.len() {
            return None;
        }
        let removed = self.reminder_times.remove(index);
        self.taken.retain(|t| !removed.matches(t));
        Some(removed)
    }

    /// `name (dosage)` or just the name when no dosage is known.
    pub fn display_name(&self) -> String {
        if self.dosage.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.dosage)
        }
    }
}

fn same_minute(a: &NaiveDateTime, b: &NaiveDateTime) -> bool {
    a.date() == b.date() && a.hour() == b.hour() && a.minute() == b.minute()
}

pub fn new_prescription_id() -> String {
    Uuid::new_v4().to_string()
}

/// Collapse reminder times sharing an hour and minute.
///
/// The first occurrence keeps its position; a later duplicate replaces it
/// only when it carries a label and the kept entry does not.
pub fn unique_reminder_times(times: &[ReminderTime]) -> Vec<ReminderTime> {
    let mut unique: Vec<ReminderTime> = Vec::with_capacity(times.len());
    for time in times {
        match unique.iter_mut().find(|kept| kept.same_slot(time)) {
            None => unique.push(time.clone()),
            Some(kept) => {
                if !time.label.is_empty() && kept.label.is_empty() {
                    *kept = time.clone();
                }
            }
        }
    }
    unique
}
