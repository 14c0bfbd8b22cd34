use serde::{Deserialize, Deserializer, Serialize};

use super::{MealSlot, ModelError, ReminderTime};

/// Shortest snooze interval the app will schedule, in minutes.
pub const MIN_SNOOZE_MINUTES: u32 = 5;

/// User preferences persisted under the `Settings` namespace.
///
/// Every field has a default, so a partially stored object is merged over
/// the defaults on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsState {
    pub snooze_time: u32,
    pub notifications_enabled: bool,
    #[serde(deserialize_with = "meal_time")]
    pub breakfast_time: ReminderTime,
    #[serde(deserialize_with = "meal_time")]
    pub lunch_time: ReminderTime,
    #[serde(deserialize_with = "meal_time")]
    pub dinner_time: ReminderTime,
}

impl Default for SettingsState {
    fn default() -> Self {
        Self {
            snooze_time: MIN_SNOOZE_MINUTES,
            notifications_enabled: true,
            breakfast_time: ReminderTime {
                hours: 8,
                minutes: 0,
                label: "Breakfast".into(),
            },
            lunch_time: ReminderTime {
                hours: 13,
                minutes: 0,
                label: "Lunch".into(),
            },
            dinner_time: ReminderTime {
                hours: 18,
                minutes: 0,
                label: "Dinner".into(),
            },
        }
    }
}

impl SettingsState {
    /// Snooze interval with the floor applied.
    pub fn snooze_minutes(&self) -> u32 {
        self.snooze_time.max(MIN_SNOOZE_MINUTES)
    }

    pub fn meal_time(&self, slot: MealSlot) -> ReminderTime {
        let (time, fallback_label) = match slot {
            MealSlot::Breakfast => (&self.breakfast_time, "Breakfast"),
            MealSlot::Lunch => (&self.lunch_time, "Lunch"),
            MealSlot::Dinner => (&self.dinner_time, "Dinner"),
        };
        let mut time = time.clone();
        if time.label.is_empty() {
            time.label = fallback_label.to_string();
        }
        time
    }

    pub fn set_meal_time(&mut self, slot: MealSlot, time: ReminderTime) -> Result<(), ModelError> {
        time.validate()?;
        match slot {
            MealSlot::Breakfast => self.breakfast_time = time,
            MealSlot::Lunch => self.lunch_time = time,
            MealSlot::Dinner => self.dinner_time = time,
        }
        Ok(())
    }

    /// Reminder times for a frequency pattern, using the current meal times.
    pub fn reminder_times_for(&self, pattern: &FrequencyPattern) -> Vec<ReminderTime> {
        pattern
            .slots()
            .into_iter()
            .map(|slot| self.meal_time(slot))
            .collect()
    }
}

/// Accepts both the object form and the older `"H:MM"` string form.
fn meal_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ReminderTime, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Object(ReminderTime),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Object(time) => Ok(time),
        Raw::Text(text) => {
            let (h, m) = text
                .split_once(':')
                .ok_or_else(|| serde::de::Error::custom(format!("bad meal time: {text}")))?;
            let hours = h.trim().parse().map_err(serde::de::Error::custom)?;
            let minutes = m.trim().parse().map_err(serde::de::Error::custom)?;
            ReminderTime::new(hours, minutes, "").map_err(serde::de::Error::custom)
        }
    }
}

/// Three meal flags parsed from a `b-l-d` string such as `1-0-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrequencyPattern {
    flags: [bool; 3],
}

impl FrequencyPattern {
    pub fn new(breakfast: bool, lunch: bool, dinner: bool) -> Self {
        Self {
            flags: [breakfast, lunch, dinner],
        }
    }

    /// Strict parse: exactly three hyphen-separated `0`/`1` fields.
    pub fn parse(pattern: &str) -> Result<Self, ModelError> {
        let parts: Vec<&str> = pattern.split('-').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(ModelError::InvalidFrequency(pattern.to_string()));
        }
        let mut flags = [false; 3];
        for (flag, part) in flags.iter_mut().zip(&parts) {
            *flag = match *part {
                "1" => true,
                "0" => false,
                _ => return Err(ModelError::InvalidFrequency(pattern.to_string())),
            };
        }
        Ok(Self { flags })
    }

    /// Strict parse, falling back to the lenient one with a warning.
    pub fn parse_or_lenient(pattern: &str) -> Self {
        Self::parse(pattern).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Frequency not in b-l-d form, reading leniently");
            Self::parse_lenient(pattern)
        })
    }

    /// Lenient parse used for model output: a field counts only when it is `1`.
    pub fn parse_lenient(pattern: &str) -> Self {
        let mut flags = [false; 3];
        for (flag, part) in flags.iter_mut().zip(pattern.split('-')) {
            *flag = part.trim() == "1";
        }
        Self { flags }
    }

    pub fn slots(&self) -> Vec<MealSlot> {
        MealSlot::ORDER
            .iter()
            .zip(self.flags)
            .filter_map(|(slot, on)| on.then_some(*slot))
            .collect()
    }

    pub fn doses_per_day(&self) -> usize {
        self.flags.iter().filter(|f| **f).count()
    }
}
