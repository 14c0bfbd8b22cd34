//! Reminder scheduling on top of a `NotificationCenter`.
//!
//! Every reminder time of a live prescription becomes one daily notification.
//! Edits replace a record's notifications wholesale: cancel everything the
//! record owns, then schedule again.

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use crate::models::{PrescriptionRecord, PrescriptionStatus, SettingsState};
use crate::notifications::{
    action_buttons, reminder_content, DeliveredNotification, NotificationCenter, NotificationData,
    NotificationError, NotificationKey, NotificationKind, NotificationRequest,
    NotificationTrigger, PermissionStatus, MEDICATION_CATEGORY,
};

/// Past this many minutes after the intended dose time, snoozing stops rescheduling.
pub const MAX_CUMULATIVE_SNOOZE_MINUTES: i64 = 60;

#[derive(Error, Debug, PartialEq)]
pub enum SchedulerError {
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),
}

/// What `schedule` did for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    Scheduled { count: usize },
    NoReminderTimes,
    /// Expired or archived; existing notifications were cancelled.
    Inactive,
    NotificationsDisabled,
    PermissionDenied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SnoozeOutcome {
    Rescheduled {
        identifier: String,
        snoozed_minutes: i64,
        fires_in_minutes: u32,
    },
    /// Cumulative snooze exceeded the cap; dropped without rescheduling.
    CapReached { snoozed_minutes: i64 },
    UnknownPrescription,
}

pub struct ReminderScheduler {
    center: Box<dyn NotificationCenter>,
}

impl ReminderScheduler {
    pub fn new(center: Box<dyn NotificationCenter>) -> Self {
        Self { center }
    }

    pub fn center(&self) -> &dyn NotificationCenter {
        self.center.as_ref()
    }

    pub fn center_mut(&mut self) -> &mut dyn NotificationCenter {
        self.center.as_mut()
    }

    /// Ask for permission and register the action buttons.
    pub fn prepare(&mut self, settings: &SettingsState) -> Result<PermissionStatus, SchedulerError> {
        let status = self.center.request_permission();
        if status != PermissionStatus::Granted {
            tracing::warn!(?status, "Notification permission not granted, reminders disabled");
            return Ok(status);
        }
        self.update_action_buttons(settings)?;
        Ok(status)
    }

    /// Refresh the snooze button title after the interval changes.
    pub fn update_action_buttons(&mut self, settings: &SettingsState) -> Result<(), SchedulerError> {
        let buttons = action_buttons(settings.snooze_minutes());
        self.center.set_category(MEDICATION_CATEGORY, &buttons)?;
        Ok(())
    }

    /// Keys currently pending that belong to `prescription_id`.
    pub fn keys_for(&self, prescription_id: &str) -> Vec<NotificationKey> {
        self.center
            .scheduled_identifiers()
            .iter()
            .filter_map(|identifier| identifier.parse::<NotificationKey>().ok())
            .filter(|key| key.belongs_to(prescription_id))
            .collect()
    }

    /// Cancel every pending notification owned by a prescription.
    pub fn cancel_for(&mut self, prescription_id: &str) -> Result<usize, SchedulerError> {
        let keys = self.keys_for(prescription_id);
        for key in &keys {
            self.center.cancel(&key.identifier())?;
        }
        if !keys.is_empty() {
            tracing::debug!(prescription_id, cancelled = keys.len(), "Cancelled reminders");
        }
        Ok(keys.len())
    }

    pub fn cancel_all(&mut self) -> Result<(), SchedulerError> {
        self.center.cancel_all()?;
        tracing::debug!("Cancelled all reminders");
        Ok(())
    }

    /// Replace a record's daily reminders.
    ///
    /// Existing notifications are always cancelled first, so a record edited
    /// down to no reminder times keeps none.
    pub fn schedule(
        &mut self,
        record: &PrescriptionRecord,
        settings: &SettingsState,
        now: NaiveDateTime,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        self.cancel_for(&record.id)?;

        if record.reminder_times.is_empty() {
            return Ok(ScheduleOutcome::NoReminderTimes);
        }
        if !PrescriptionStatus::of(record, now.date()).wants_reminders() {
            return Ok(ScheduleOutcome::Inactive);
        }
        if !settings.notifications_enabled {
            return Ok(ScheduleOutcome::NotificationsDisabled);
        }
        if self.center.permission() != PermissionStatus::Granted {
            tracing::warn!(prescription_id = %record.id, "Skipping reminders: permission not granted");
            return Ok(ScheduleOutcome::PermissionDenied);
        }

        for time in &record.reminder_times {
            let key = NotificationKey::daily(&record.id, time);
            let request = NotificationRequest {
                identifier: key.identifier(),
                content: reminder_content(record, &key, None),
                trigger: NotificationTrigger::Daily {
                    hour: time.hours,
                    minute: time.minutes,
                },
            };
            self.center.schedule(request, now)?;
        }

        tracing::debug!(
            prescription_id = %record.id,
            count = record.reminder_times.len(),
            "Scheduled daily reminders"
        );
        Ok(ScheduleOutcome::Scheduled {
            count: record.reminder_times.len(),
        })
    }

    /// Schedule every record; returns the number of notifications created.
    ///
    /// A record the platform rejects is logged and skipped; the rest are
    /// still scheduled.
    pub fn schedule_all(
        &mut self,
        records: &[PrescriptionRecord],
        settings: &SettingsState,
        now: NaiveDateTime,
    ) -> Result<usize, SchedulerError> {
        let mut total = 0;
        for record in records {
            match self.schedule(record, settings, now) {
                Ok(ScheduleOutcome::Scheduled { count }) => total += count,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(prescription_id = %record.id, error = %e, "Skipping reminders for prescription");
                    self.cancel_for(&record.id)?;
                }
            }
        }
        tracing::info!(
            prescriptions = records.len(),
            notifications = total,
            "Reminders scheduled"
        );
        Ok(total)
    }

    pub fn reschedule_all(
        &mut self,
        records: &[PrescriptionRecord],
        settings: &SettingsState,
        now: NaiveDateTime,
    ) -> Result<usize, SchedulerError> {
        self.cancel_all()?;
        self.schedule_all(records, settings, now)
    }

    /// Snooze a shown reminder.
    ///
    /// The cap counts from the first snooze press (`snoozed_since` in the
    /// payload, else now). The follow-up keeps the dose time it stands for,
    /// so Taken on it still logs the original slot. The shown notification
    /// is dismissed whatever the outcome.
    pub fn snooze(
        &mut self,
        record: Option<&PrescriptionRecord>,
        data: &NotificationData,
        settings: &SettingsState,
        now: NaiveDateTime,
    ) -> Result<SnoozeOutcome, SchedulerError> {
        let notification_id = data.notification_id.as_str();
        let key = notification_id.parse::<NotificationKey>().ok();
        let intended = snooze_intended_time(key.as_ref(), data.intended_taken_time, now);
        let snoozed_since = data.snoozed_since.unwrap_or(now);
        let snoozed_minutes = cumulative_snooze_minutes(snoozed_since, now);

        let outcome = match record {
            None => SnoozeOutcome::UnknownPrescription,
            Some(_) if snoozed_minutes > MAX_CUMULATIVE_SNOOZE_MINUTES => {
                tracing::info!(notification_id, snoozed_minutes, "Snooze cap reached, not rescheduling");
                SnoozeOutcome::CapReached { snoozed_minutes }
            }
            Some(record) => {
                let key = NotificationKey::snoozed(&record.id, intended);
                let minutes = settings.snooze_minutes();
                let mut content = reminder_content(record, &key, Some(intended));
                content.data.snoozed_since = Some(snoozed_since);
                let request = NotificationRequest {
                    identifier: key.identifier(),
                    content,
                    trigger: NotificationTrigger::After {
                        seconds: u64::from(minutes) * 60,
                    },
                };
                self.center.schedule(request, now)?;
                tracing::debug!(notification_id, snoozed_minutes, minutes, "Reminder snoozed");
                SnoozeOutcome::Rescheduled {
                    identifier: key.identifier(),
                    snoozed_minutes,
                    fires_in_minutes: minutes,
                }
            }
        };

        self.center.dismiss(notification_id)?;
        Ok(outcome)
    }

    pub fn dismiss(&mut self, notification_id: &str) -> Result<(), SchedulerError> {
        self.center.dismiss(notification_id)?;
        Ok(())
    }

    pub fn take_due(&mut self, now: NaiveDateTime) -> Vec<DeliveredNotification> {
        self.center.take_due(now)
    }
}

/// Dose timestamp logged when a reminder's Taken action is pressed.
///
/// Daily reminders resolve to today's date at the slot time; snoozed
/// reminders keep the dose time they were created for.
pub fn taken_time_for(key: &NotificationKey, now: NaiveDateTime) -> NaiveDateTime {
    key.intended_on(now.date())
}

/// When the snoozed dose was originally due.
///
/// A payload time wins; a daily key resolves to today's slot (never in the
/// future); otherwise the snooze starts now.
pub fn snooze_intended_time(
    key: Option<&NotificationKey>,
    intended_taken_time: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> NaiveDateTime {
    if let Some(intended) = intended_taken_time {
        return intended;
    }
    match key {
        Some(key) => match &key.kind {
            NotificationKind::Daily { .. } => key.intended_on(now.date()).min(now),
            NotificationKind::Snoozed { intended_at } => *intended_at,
        },
        None => now,
    }
}

/// Whole minutes between the first snooze press and now.
pub fn cumulative_snooze_minutes(since: NaiveDateTime, now: NaiveDateTime) -> i64 {
    (now - since).num_seconds().div_euclid(60)
}
