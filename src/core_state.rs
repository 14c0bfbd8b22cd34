//! Transport-agnostic application state.
//!
//! `CoreState` owns every store and is the only thing IPC commands talk to.
//! Wrapped in `Arc` at startup. Lock order is prescriptions → scheduler →
//! user data; settings are snapshotted (and released) before taking the
//! others.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::adherence::AdherenceSummary;
use crate::calendar::{self, AgendaEntry, MarkedDates};
use crate::config;
use crate::extraction::{
    parse_drugs, parse_envelope, run_cancellable, CancelRegistry, ExtractionError,
    ExtractionOutcome, ExtractionRequest, ExtractionTransport, HttpExtractionClient, RateLimiter,
};
use crate::models::{
    MealSlot, ModelError, PrescriptionRecord, PrescriptionStatus, ReminderTime, SettingsState,
};
use crate::notifications::local::LocalNotificationCenter;
use crate::notifications::{
    DeliveredNotification, NotificationAction, NotificationCenter, NotificationData,
    NotificationError, NotificationKey, PermissionStatus,
};
use crate::prescriptions::{PrescriptionEdit, PrescriptionStore, StoreError};
use crate::scheduler::{
    taken_time_for, ReminderScheduler, ScheduleOutcome, SchedulerError, SnoozeOutcome,
};
use crate::settings::SettingsStore;
use crate::storage::{SharedUserData, UserDataStore};

/// Source of "now" (local wall clock).
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// What a notification button press did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionOutcome {
    Taken {
        at: NaiveDateTime,
        newly_recorded: bool,
    },
    Snoozed(SnoozeOutcome),
    Skipped,
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    user_data: SharedUserData,
    prescriptions: RwLock<PrescriptionStore>,
    settings: RwLock<SettingsStore>,
    scheduler: Mutex<ReminderScheduler>,
    rate_limiter: RateLimiter,
    cancels: CancelRegistry,
    extraction_url: String,
    clock: Clock,
}

impl CoreState {
    /// State backed by the platform data dir and an in-process notification center.
    pub fn new() -> Self {
        Self::with_parts(
            config::user_data_path(),
            Box::new(LocalNotificationCenter::new()),
        )
    }

    pub fn with_parts(user_data_path: PathBuf, center: Box<dyn NotificationCenter>) -> Self {
        let user_data = UserDataStore::shared(user_data_path);
        Self {
            prescriptions: RwLock::new(PrescriptionStore::new(user_data.clone())),
            settings: RwLock::new(SettingsStore::new(user_data.clone())),
            scheduler: Mutex::new(ReminderScheduler::new(center)),
            rate_limiter: RateLimiter::new(user_data.clone(), config::EXTRACT_RATE_LIMIT_KEY),
            cancels: CancelRegistry::new(),
            extraction_url: config::extraction_url(),
            clock: Arc::new(local_now),
            user_data,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_extraction_url(mut self, url: &str) -> Self {
        self.extraction_url = url.to_string();
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }

    // ── Lock helpers ────────────────────────────────────────

    fn read_prescriptions(&self) -> Result<RwLockReadGuard<'_, PrescriptionStore>, CoreError> {
        self.prescriptions.read().map_err(|_| CoreError::LockPoisoned)
    }

    fn write_prescriptions(&self) -> Result<RwLockWriteGuard<'_, PrescriptionStore>, CoreError> {
        self.prescriptions.write().map_err(|_| CoreError::LockPoisoned)
    }

    fn lock_scheduler(&self) -> Result<MutexGuard<'_, ReminderScheduler>, CoreError> {
        self.scheduler.lock().map_err(|_| CoreError::LockPoisoned)
    }

    fn write_settings(&self) -> Result<RwLockWriteGuard<'_, SettingsStore>, CoreError> {
        self.settings.write().map_err(|_| CoreError::LockPoisoned)
    }

    /// Copy of the current settings; the lock is released on return.
    pub fn settings(&self) -> Result<SettingsState, CoreError> {
        let guard = self.settings.read().map_err(|_| CoreError::LockPoisoned)?;
        Ok(guard.snapshot())
    }

    // ── Lifecycle ───────────────────────────────────────────

    /// Load stores, register notification buttons and reschedule every
    /// reminder. Safe to call more than once.
    pub fn initialize(&self) -> Result<PermissionStatus, CoreError> {
        self.write_settings()?.initialize();
        let settings = self.settings()?;
        let now = self.now();

        let mut prescriptions = self.write_prescriptions()?;
        prescriptions.initialize()?;
        let mut scheduler = self.lock_scheduler()?;
        let permission = scheduler.prepare(&settings)?;
        let scheduled = scheduler.reschedule_all(prescriptions.all(), &settings, now)?;

        tracing::info!(
            prescriptions = prescriptions.len(),
            scheduled,
            ?permission,
            "Core state initialized"
        );
        Ok(permission)
    }

    pub fn is_ready(&self) -> bool {
        let prescriptions = self.prescriptions.read().map(|p| p.is_ready()).unwrap_or(false);
        let settings = self.settings.read().map(|s| s.is_ready()).unwrap_or(false);
        prescriptions && settings
    }

    // ── Prescription queries ────────────────────────────────

    pub fn prescriptions(&self) -> Result<Vec<PrescriptionRecord>, CoreError> {
        Ok(self.read_prescriptions()?.all().to_vec())
    }

    pub fn prescription(&self, id: &str) -> Result<Option<PrescriptionRecord>, CoreError> {
        Ok(self.read_prescriptions()?.get(id).cloned())
    }

    pub fn active_prescriptions(&self) -> Result<Vec<PrescriptionRecord>, CoreError> {
        Ok(self.read_prescriptions()?.active().into_iter().cloned().collect())
    }

    pub fn archived_prescriptions(&self) -> Result<Vec<PrescriptionRecord>, CoreError> {
        Ok(self.read_prescriptions()?.archived().into_iter().cloned().collect())
    }

    pub fn prescriptions_with_status(
        &self,
        status: PrescriptionStatus,
    ) -> Result<Vec<PrescriptionRecord>, CoreError> {
        let today = self.today();
        Ok(self
            .read_prescriptions()?
            .with_status(status, today)
            .into_iter()
            .cloned()
            .collect())
    }

    // ── Prescription mutations ──────────────────────────────

    pub fn add_prescription(
        &self,
        record: PrescriptionRecord,
    ) -> Result<(PrescriptionRecord, ScheduleOutcome), CoreError> {
        let settings = self.settings()?;
        let now = self.now();
        let mut prescriptions = self.write_prescriptions()?;
        let mut scheduler = self.lock_scheduler()?;
        Ok(prescriptions.add(record, &mut scheduler, &settings, now)?)
    }

    pub fn update_prescription(
        &self,
        id: &str,
        edit: &PrescriptionEdit,
    ) -> Result<(PrescriptionRecord, ScheduleOutcome), CoreError> {
        let settings = self.settings()?;
        let now = self.now();
        let mut prescriptions = self.write_prescriptions()?;
        let mut scheduler = self.lock_scheduler()?;
        Ok(prescriptions.update(id, edit, &mut scheduler, &settings, now)?)
    }

    pub fn remove_prescription(&self, id: &str) -> Result<bool, CoreError> {
        let mut prescriptions = self.write_prescriptions()?;
        let mut scheduler = self.lock_scheduler()?;
        Ok(prescriptions.remove(id, &mut scheduler)?)
    }

    pub fn remove_reminder_time(&self, id: &str, index: usize) -> Result<Option<ReminderTime>, CoreError> {
        let settings = self.settings()?;
        let now = self.now();
        let mut prescriptions = self.write_prescriptions()?;
        let mut scheduler = self.lock_scheduler()?;
        Ok(prescriptions.remove_reminder_time(id, index, &mut scheduler, &settings, now)?)
    }

    pub fn set_archived(&self, id: &str, archived: bool) -> Result<ScheduleOutcome, CoreError> {
        let settings = self.settings()?;
        let now = self.now();
        let mut prescriptions = self.write_prescriptions()?;
        let mut scheduler = self.lock_scheduler()?;
        Ok(prescriptions.set_archived(id, archived, &mut scheduler, &settings, now)?)
    }

    /// Agenda tap: flip a dose at `at`. Returns whether it is now taken.
    pub fn toggle_taken(&self, id: &str, at: NaiveDateTime) -> Result<bool, CoreError> {
        Ok(self.write_prescriptions()?.toggle_taken(id, at)?)
    }

    pub fn record_taken(&self, id: &str, at: NaiveDateTime) -> Result<bool, CoreError> {
        Ok(self.write_prescriptions()?.record_taken(id, at)?)
    }

    pub fn clear_prescriptions(&self) -> Result<(), CoreError> {
        let mut prescriptions = self.write_prescriptions()?;
        let mut scheduler = self.lock_scheduler()?;
        Ok(prescriptions.clear(&mut scheduler)?)
    }

    // ── Settings ────────────────────────────────────────────

    /// Returns the interval stored; refreshes the snooze button title.
    pub fn set_snooze_minutes(&self, minutes: u32) -> Result<u32, CoreError> {
        let applied = self.write_settings()?.set_snooze_minutes(minutes);
        let settings = self.settings()?;
        self.lock_scheduler()?.update_action_buttons(&settings)?;
        Ok(applied)
    }

    /// Persist the toggle; enabling reschedules everything, disabling cancels
    /// everything. Returns the number of notifications now pending.
    pub fn set_notifications_enabled(&self, enabled: bool) -> Result<usize, CoreError> {
        self.write_settings()?.set_notifications_enabled(enabled);
        let settings = self.settings()?;
        let now = self.now();

        let prescriptions = self.read_prescriptions()?;
        let mut scheduler = self.lock_scheduler()?;
        if enabled {
            Ok(scheduler.reschedule_all(prescriptions.all(), &settings, now)?)
        } else {
            scheduler.cancel_all()?;
            Ok(0)
        }
    }

    pub fn set_meal_time(&self, slot: MealSlot, time: ReminderTime) -> Result<SettingsState, CoreError> {
        let mut settings = self.write_settings()?;
        settings.set_meal_time(slot, time)?;
        Ok(settings.snapshot())
    }

    pub fn reminder_times_for(&self, frequency: &str) -> Result<Vec<ReminderTime>, CoreError> {
        let settings = self.settings.read().map_err(|_| CoreError::LockPoisoned)?;
        Ok(settings.reminder_times_for(frequency))
    }

    // ── Notifications ───────────────────────────────────────

    /// Handle a Taken / Snooze / Skip press on a shown reminder.
    pub fn handle_notification_action(
        &self,
        action: NotificationAction,
        data: &NotificationData,
    ) -> Result<ActionOutcome, CoreError> {
        let now = self.now();
        match action {
            NotificationAction::Taken => {
                let key: NotificationKey = data.notification_id.parse()?;
                let at = taken_time_for(&key, now);
                let mut prescriptions = self.write_prescriptions()?;
                let newly_recorded = match prescriptions.record_taken(&data.id, at) {
                    Ok(added) => added,
                    Err(StoreError::NotFound(id)) => {
                        tracing::warn!(prescription_id = %id, "Taken action for unknown prescription");
                        false
                    }
                    Err(e) => return Err(e.into()),
                };
                self.lock_scheduler()?.dismiss(&data.notification_id)?;
                tracing::info!(prescription_id = %data.id, %at, newly_recorded, "Dose taken");
                Ok(ActionOutcome::Taken { at, newly_recorded })
            }
            NotificationAction::Snooze => {
                let settings = self.settings()?;
                let prescriptions = self.read_prescriptions()?;
                let mut scheduler = self.lock_scheduler()?;
                let outcome = scheduler.snooze(prescriptions.get(&data.id), data, &settings, now)?;
                Ok(ActionOutcome::Snoozed(outcome))
            }
            NotificationAction::Skip => {
                self.lock_scheduler()?.dismiss(&data.notification_id)?;
                tracing::info!(prescription_id = %data.id, "Dose skipped");
                Ok(ActionOutcome::Skipped)
            }
        }
    }

    /// Fire due reminders (polled by the dispatcher).
    pub fn take_due_notifications(&self) -> Result<Vec<DeliveredNotification>, CoreError> {
        let now = self.now();
        Ok(self.lock_scheduler()?.take_due(now))
    }

    pub fn scheduled_notifications(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.lock_scheduler()?.center().scheduled_identifiers())
    }

    pub fn notification_permission(&self) -> Result<PermissionStatus, CoreError> {
        Ok(self.lock_scheduler()?.center().permission())
    }

    // ── Adherence & calendar ────────────────────────────────

    pub fn adherence(&self, id: &str) -> Result<Option<AdherenceSummary>, CoreError> {
        let now = self.now();
        Ok(self
            .read_prescriptions()?
            .get(id)
            .map(|record| AdherenceSummary::of(record, now)))
    }

    pub fn adherence_all(&self) -> Result<Vec<AdherenceSummary>, CoreError> {
        let now = self.now();
        Ok(self
            .read_prescriptions()?
            .all()
            .iter()
            .map(|record| AdherenceSummary::of(record, now))
            .collect())
    }

    pub fn calendar_marks(&self) -> Result<MarkedDates, CoreError> {
        Ok(calendar::build_marks(self.read_prescriptions()?.all()))
    }

    pub fn day_agenda(&self, day: NaiveDate) -> Result<Vec<AgendaEntry>, CoreError> {
        let now = self.now();
        Ok(calendar::day_agenda(self.read_prescriptions()?.all(), day, now))
    }

    // ── Extraction ──────────────────────────────────────────

    pub fn extraction_client(&self) -> Result<HttpExtractionClient, CoreError> {
        Ok(HttpExtractionClient::new(&self.extraction_url)?.with_bearer_token(config::extraction_token()))
    }

    /// Send a label image, turn the answer into prescriptions and add them.
    ///
    /// No lock is held while the request is in flight.
    pub async fn extract_prescriptions<T: ExtractionTransport>(
        &self,
        transport: &T,
        request: &ExtractionRequest,
    ) -> Result<ExtractionOutcome, CoreError> {
        self.rate_limiter
            .check(self.now())
            .map_err(|retry_after_secs| ExtractionError::RateLimited { retry_after_secs })?;

        let body = run_cancellable(&self.cancels, transport.extract(request)).await?;
        let content = parse_envelope(&body)?;
        let drugs = parse_drugs(&content);

        let settings = self.settings()?;
        let now = self.now();
        let mut added = Vec::with_capacity(drugs.len());
        for drug in &drugs {
            let (record, _) = self.add_prescription(drug.to_record(&settings, now))?;
            added.push(record);
        }

        tracing::info!(count = added.len(), "Prescriptions extracted");
        Ok(ExtractionOutcome::new(added))
    }

    /// Cancel every in-flight extraction. Returns how many were cancelled.
    pub fn cancel_extractions(&self) -> usize {
        self.cancels.cancel_all()
    }

    pub fn extraction_remaining_calls(&self) -> usize {
        self.rate_limiter.remaining_calls(self.now())
    }

    /// Path of the backing user-data file.
    pub fn user_data_path(&self) -> Result<PathBuf, CoreError> {
        let data = self.user_data.lock().map_err(|_| CoreError::LockPoisoned)?;
        Ok(data.path().to_path_buf())
    }
}

impl Default for CoreState {
    fn default() -> Self {
        Self::new()
    }
}
