//! Local notification platform seam.
//!
//! Reminder identity is a structured `NotificationKey`; it is turned into the
//! platform's string identifier only when a request crosses the
//! `NotificationCenter` boundary, and parsed back when reading the platform's
//! pending list.

pub mod dispatcher;
pub mod local;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{FoodTiming, PrescriptionRecord, ReminderTime};

/// Category carrying the Taken / Snooze / Skip buttons.
pub const MEDICATION_CATEGORY: &str = "medication-reminder";

const NOTIFICATION_TITLE: &str = "Medication Reminder";
const SNOOZED_SUFFIX: &str = "snoozed";

#[derive(Error, Debug, PartialEq)]
pub enum NotificationError {
    #[error("Notification permission not granted")]
    PermissionDenied,

    #[error("Unrecognised notification identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Notification platform error: {0}")]
    Platform(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

// ═══════════════════════════════════════════════════════════
// Keys
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// Repeats every day at a reminder slot.
    Daily { hour: u32, minute: u32 },
    /// One-shot follow-up for a dose originally due at `intended_at`.
    Snoozed { intended_at: NaiveDateTime },
}

/// Identity of a scheduled reminder.
///
/// Wire forms: `{id}_{hour}_{minute}` and `{id}_{intended millis}_snoozed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub prescription_id: String,
    pub kind: NotificationKind,
}

impl NotificationKey {
    pub fn daily(prescription_id: &str, time: &ReminderTime) -> Self {
        Self {
            prescription_id: prescription_id.to_string(),
            kind: NotificationKind::Daily {
                hour: time.hours,
                minute: time.minutes,
            },
        }
    }

    pub fn snoozed(prescription_id: &str, intended_at: NaiveDateTime) -> Self {
        Self {
            prescription_id: prescription_id.to_string(),
            kind: NotificationKind::Snoozed { intended_at },
        }
    }

    pub fn belongs_to(&self, prescription_id: &str) -> bool {
        self.prescription_id == prescription_id
    }

    /// The dose timestamp this notification stands for, on `today` for daily keys.
    pub fn intended_on(&self, today: NaiveDate) -> NaiveDateTime {
        match &self.kind {
            NotificationKind::Daily { hour, minute } => today
                .and_hms_opt(*hour, *minute, 0)
                .unwrap_or_else(|| today.and_time(chrono::NaiveTime::MIN)),
            NotificationKind::Snoozed { intended_at } => *intended_at,
        }
    }

    pub fn identifier(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NotificationKind::Daily { hour, minute } => {
                write!(f, "{}_{}_{}", self.prescription_id, hour, minute)
            }
            NotificationKind::Snoozed { intended_at } => write!(
                f,
                "{}_{}_{}",
                self.prescription_id,
                intended_at.and_utc().timestamp_millis(),
                SNOOZED_SUFFIX
            ),
        }
    }
}

impl FromStr for NotificationKey {
    type Err = NotificationError;

    /// Parses from the right, so ids that contain `_` survive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NotificationError::InvalidIdentifier(s.to_string());

        if let Some(rest) = s.strip_suffix(SNOOZED_SUFFIX).and_then(|r| r.strip_suffix('_')) {
            let (id, millis) = rest.rsplit_once('_').ok_or_else(invalid)?;
            let millis: i64 = millis.parse().map_err(|_| invalid())?;
            let intended_at = DateTime::from_timestamp_millis(millis)
                .ok_or_else(invalid)?
                .naive_utc();
            if id.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::snoozed(id, intended_at));
        }

        let (rest, minute) = s.rsplit_once('_').ok_or_else(invalid)?;
        let (id, hour) = rest.rsplit_once('_').ok_or_else(invalid)?;
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        if id.is_empty() || hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Self {
            prescription_id: id.to_string(),
            kind: NotificationKind::Daily { hour, minute },
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationTrigger {
    Daily { hour: u32, minute: u32 },
    After { seconds: u64 },
}

/// Payload attached to a notification and handed back with the user's action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub id: String,
    pub notification_id: String,
    #[serde(default)]
    pub intended_taken_time: Option<NaiveDateTime>,
    /// When the first snooze for this dose was pressed.
    #[serde(default)]
    pub snoozed_since: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub sound: bool,
    pub auto_dismiss: bool,
    pub category_identifier: String,
    pub data: NotificationData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub identifier: String,
    pub content: NotificationContent,
    pub trigger: NotificationTrigger,
}

/// A notification that fired and is now shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredNotification {
    pub identifier: String,
    pub content: NotificationContent,
    pub fired_at: NaiveDateTime,
}

/// Body text, e.g. `Time to take your Amoxicillin (500mg), take it after food.`
pub fn reminder_body(record: &PrescriptionRecord) -> String {
    let mut body = format!("Time to take your {}", record.name);
    if !record.dosage.is_empty() {
        body.push_str(&format!(" ({})", record.dosage));
    }
    match record.food {
        FoodTiming::NoPreference => body.push('.'),
        FoodTiming::BeforeFood => body.push_str(", take it before food."),
        FoodTiming::AfterFood => body.push_str(", take it after food."),
    }
    body
}

pub fn reminder_content(
    record: &PrescriptionRecord,
    key: &NotificationKey,
    intended_taken_time: Option<NaiveDateTime>,
) -> NotificationContent {
    NotificationContent {
        title: NOTIFICATION_TITLE.to_string(),
        body: reminder_body(record),
        sound: true,
        auto_dismiss: false,
        category_identifier: MEDICATION_CATEGORY.to_string(),
        data: NotificationData {
            id: record.id.clone(),
            notification_id: key.identifier(),
            intended_taken_time,
            snoozed_since: None,
        },
    }
}

// ═══════════════════════════════════════════════════════════
// Actions
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    Taken,
    Snooze,
    Skip,
}

impl NotificationAction {
    pub fn identifier(&self) -> &'static str {
        match self {
            Self::Taken => "TAKEN_ACTION",
            Self::Snooze => "SNOOZE_ACTION",
            Self::Skip => "SKIP_ACTION",
        }
    }

    pub fn from_identifier(identifier: &str) -> Option<Self> {
        match identifier {
            "TAKEN_ACTION" => Some(Self::Taken),
            "SNOOZE_ACTION" => Some(Self::Snooze),
            "SKIP_ACTION" => Some(Self::Skip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionButton {
    pub identifier: String,
    pub button_title: String,
    pub opens_app_to_foreground: bool,
}

/// Buttons for the medication category; the snooze title shows the interval.
pub fn action_buttons(snooze_minutes: u32) -> Vec<ActionButton> {
    [
        (NotificationAction::Taken, "Taken".to_string()),
        (NotificationAction::Snooze, format!("Snooze for {snooze_minutes} min")),
        (NotificationAction::Skip, "Skip".to_string()),
    ]
    .into_iter()
    .map(|(action, title)| ActionButton {
        identifier: action.identifier().to_string(),
        button_title: title,
        opens_app_to_foreground: false,
    })
    .collect()
}

// ═══════════════════════════════════════════════════════════
// Platform trait
// ═══════════════════════════════════════════════════════════

/// The device's local notification service.
pub trait NotificationCenter: Send {
    fn permission(&self) -> PermissionStatus;

    /// Prompt for permission if it has not been decided yet.
    fn request_permission(&mut self) -> PermissionStatus;

    fn set_category(
        &mut self,
        category: &str,
        actions: &[ActionButton],
    ) -> Result<(), NotificationError>;

    /// Schedule or replace the request with the same identifier.
    fn schedule(
        &mut self,
        request: NotificationRequest,
        now: NaiveDateTime,
    ) -> Result<(), NotificationError>;

    fn scheduled_identifiers(&self) -> Vec<String>;

    fn cancel(&mut self, identifier: &str) -> Result<(), NotificationError>;

    fn cancel_all(&mut self) -> Result<(), NotificationError>;

    /// Remove a shown notification from the tray.
    fn dismiss(&mut self, identifier: &str) -> Result<(), NotificationError>;

    /// Fire whatever is due. Platforms that deliver on their own return nothing.
    fn take_due(&mut self, _now: NaiveDateTime) -> Vec<DeliveredNotification> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn daily_key_wire_format() {
        let key = NotificationKey::daily("1712000000000", &ReminderTime::new(8, 5, "").unwrap());
        assert_eq!(key.identifier(), "1712000000000_8_5");
        assert_eq!(key.identifier().parse::<NotificationKey>().unwrap(), key);
    }

    #[test]
    fn snoozed_key_round_trips_intended_time() {
        let key = NotificationKey::snoozed("abc", at(8, 0));
        let wire = key.identifier();
        assert!(wire.ends_with("_snoozed"));
        let parsed: NotificationKey = wire.parse().unwrap();
        assert_eq!(parsed.kind, NotificationKind::Snoozed { intended_at: at(8, 0) });
        assert_eq!(parsed.prescription_id, "abc");
    }

    #[test]
    fn ids_with_underscores_parse_from_the_right() {
        let key = NotificationKey::daily("rx_2024_a", &ReminderTime::new(21, 30, "").unwrap());
        let parsed: NotificationKey = key.identifier().parse().unwrap();
        assert_eq!(parsed.prescription_id, "rx_2024_a");
    }

    #[test]
    fn rejects_unrelated_identifiers() {
        assert!("".parse::<NotificationKey>().is_err());
        assert!("onlyid".parse::<NotificationKey>().is_err());
        assert!("id_25_00".parse::<NotificationKey>().is_err());
        assert!("id_x_snoozed".parse::<NotificationKey>().is_err());
        assert!("_8_0".parse::<NotificationKey>().is_err());
    }

    #[test]
    fn ownership_is_exact_not_prefix() {
        let key = NotificationKey::daily("1234", &ReminderTime::new(8, 0, "").unwrap());
        assert!(key.belongs_to("1234"));
        assert!(!key.belongs_to("123"));
    }

    #[test]
    fn intended_time_for_daily_key_uses_given_day() {
        let key = NotificationKey::daily("a", &ReminderTime::new(13, 15, "").unwrap());
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(key.intended_on(day), at(13, 15));
    }

    #[test]
    fn body_mentions_dosage_and_food() {
        let mut record = PrescriptionRecord::new("Amoxicillin", at(7, 0));
        assert_eq!(reminder_body(&record), "Time to take your Amoxicillin.");
        record.dosage = "500mg".into();
        record.food = FoodTiming::AfterFood;
        assert_eq!(
            reminder_body(&record),
            "Time to take your Amoxicillin (500mg), take it after food."
        );
        record.food = FoodTiming::BeforeFood;
        assert!(reminder_body(&record).ends_with("take it before food."));
    }

    #[test]
    fn content_carries_action_payload() {
        let record = PrescriptionRecord::new("Ibuprofen", at(7, 0));
        let key = NotificationKey::daily(&record.id, &ReminderTime::new(8, 0, "").unwrap());
        let content = reminder_content(&record, &key, None);
        assert_eq!(content.category_identifier, MEDICATION_CATEGORY);
        assert_eq!(content.data.id, record.id);
        assert_eq!(content.data.notification_id, key.identifier());
        let json = serde_json::to_value(&content.data).unwrap();
        assert!(json.get("notificationId").is_some());
    }

    #[test]
    fn action_identifiers_round_trip() {
        for action in [
            NotificationAction::Taken,
            NotificationAction::Snooze,
            NotificationAction::Skip,
        ] {
            assert_eq!(NotificationAction::from_identifier(action.identifier()), Some(action));
        }
        assert_eq!(NotificationAction::from_identifier("OPEN"), None);
    }

    #[test]
    fn snooze_button_shows_interval() {
        let buttons = action_buttons(10);
        assert_eq!(buttons.len(), 3);
        assert_eq!(buttons[1].button_title, "Snooze for 10 min");
        assert!(buttons.iter().all(|b| !b.opens_app_to_foreground));
    }
}
