//! The in-memory list of records and its persistence.
//!
//! The list is loaded from the `Prescriptions` namespace once and is the
//! authority afterwards; every mutation writes the whole list back. A failed
//! save is logged and the in-memory state is kept as is.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    new_prescription_id, unique_reminder_times, FoodTiming, ModelError, PrescriptionRecord,
    PrescriptionStatus, ReminderTime, SettingsState,
};
use crate::scheduler::{ReminderScheduler, ScheduleOutcome, SchedulerError};
use crate::storage::SharedUserData;

/// Namespace key inside the user-data blob.
pub const NAMESPACE: &str = "Prescriptions";

#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("Prescription not found: {0}")]
    NotFound(String),

    #[error("Prescription already exists: {0}")]
    DuplicateId(String),

    #[error("User data lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Field-level changes from the edit form. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrescriptionEdit {
    pub name: Option<String>,
    pub dosage: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub food: Option<FoodTiming>,
    pub reminder_times: Option<Vec<ReminderTime>>,
    pub start_at: Option<NaiveDateTime>,
    pub end_at: Option<NaiveDateTime>,
}

impl PrescriptionEdit {
    /// Apply onto a copy of `record`; reminder times are de-duplicated.
    pub fn applied_to(&self, record: &PrescriptionRecord) -> Result<PrescriptionRecord, ModelError> {
        let mut updated = record.clone();
        if let Some(name) = &self.name {
            updated.name = name.trim().to_string();
        }
        if let Some(dosage) = &self.dosage {
            updated.dosage = dosage.trim().to_string();
        }
        if let Some(kind) = &self.kind {
            updated.kind = kind.trim().to_string();
        }
        if let Some(food) = self.food {
            updated.food = food;
        }
        if let Some(times) = &self.reminder_times {
            for time in times {
                ReminderTime::new(time.hours, time.minutes, &time.label)?;
            }
            updated.reminder_times = unique_reminder_times(times);
        }
        if let Some(start) = self.start_at {
            updated.start_at = start;
        }
        if let Some(end) = self.end_at {
            updated.end_at = end;
        }
        updated.validate()?;
        Ok(updated)
    }
}

pub struct PrescriptionStore {
    data: SharedUserData,
    records: Vec<PrescriptionRecord>,
    ready: bool,
}

impl PrescriptionStore {
    pub fn new(data: SharedUserData) -> Self {
        Self {
            data,
            records: Vec::new(),
            ready: false,
        }
    }

    /// Load the list once. Later calls are no-ops.
    pub fn initialize(&mut self) -> Result<(), StoreError> {
        if self.ready {
            return Ok(());
        }
        let mut data = self.data.lock().map_err(|_| StoreError::LockPoisoned)?;
        let stored: Vec<serde_json::Value> = data.try_get(NAMESPACE, Vec::new());
        self.records = stored
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<PrescriptionRecord>(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping unreadable prescription");
                    None
                }
            })
            .collect();
        self.ready = true;
        tracing::info!(count = self.records.len(), "Prescriptions loaded");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn all(&self) -> &[PrescriptionRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&PrescriptionRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records not archived, regardless of dates.
    pub fn active(&self) -> Vec<&PrescriptionRecord> {
        self.records.iter().filter(|r| !r.archived).collect()
    }

    pub fn archived(&self) -> Vec<&PrescriptionRecord> {
        self.records.iter().filter(|r| r.archived).collect()
    }

    pub fn with_status(&self, status: PrescriptionStatus, today: NaiveDate) -> Vec<&PrescriptionRecord> {
        self.records
            .iter()
            .filter(|r| PrescriptionStatus::of(r, today) == status)
            .collect()
    }

    /// Append a record, schedule its reminders and persist.
    ///
    /// An empty id gets a fresh one; reminder times are de-duplicated.
    pub fn add(
        &mut self,
        mut record: PrescriptionRecord,
        scheduler: &mut ReminderScheduler,
        settings: &SettingsState,
        now: NaiveDateTime,
    ) -> Result<(PrescriptionRecord, ScheduleOutcome), StoreError> {
        self.initialize()?;
        if record.id.is_empty() {
            record.id = new_prescription_id();
        }
        if self.get(&record.id).is_some() {
            return Err(StoreError::DuplicateId(record.id));
        }
        record.reminder_times = unique_reminder_times(&record.reminder_times);
        record.validate()?;

        let outcome = scheduler.schedule(&record, settings, now)?;
        self.records.push(record.clone());
        self.persist();
        tracing::info!(prescription_id = %record.id, "Prescription added");
        Ok((record, outcome))
    }

    /// Apply an edit and replace the record's reminders.
    pub fn update(
        &mut self,
        id: &str,
        edit: &PrescriptionEdit,
        scheduler: &mut ReminderScheduler,
        settings: &SettingsState,
        now: NaiveDateTime,
    ) -> Result<(PrescriptionRecord, ScheduleOutcome), StoreError> {
        self.initialize()?;
        let index = self.position(id)?;
        let updated = edit.applied_to(&self.records[index])?;

        let outcome = scheduler.schedule(&updated, settings, now)?;
        self.records[index] = updated.clone();
        self.persist();
        tracing::info!(prescription_id = id, "Prescription updated");
        Ok((updated, outcome))
    }

    /// Remove a reminder slot and the taken entries logged at it.
    pub fn remove_reminder_time(
        &mut self,
        id: &str,
        index: usize,
        scheduler: &mut ReminderScheduler,
        settings: &SettingsState,
        now: NaiveDateTime,
    ) -> Result<Option<ReminderTime>, StoreError> {
        self.initialize()?;
        let position = self.position(id)?;
        let removed = self.records[position].remove_reminder_time(index);
        if removed.is_some() {
            scheduler.schedule(&self.records[position], settings, now)?;
            self.persist();
        }
        Ok(removed)
    }

    /// Cancel reminders, drop the record, persist. Unknown ids are a no-op.
    pub fn remove(&mut self, id: &str, scheduler: &mut ReminderScheduler) -> Result<bool, StoreError> {
        self.initialize()?;
        let Some(index) = self.records.iter().position(|r| r.id == id) else {
            tracing::debug!(prescription_id = id, "Remove ignored, no such prescription");
            return Ok(false);
        };
        scheduler.cancel_for(id)?;
        self.records.remove(index);
        self.persist();
        tracing::info!(prescription_id = id, "Prescription removed");
        Ok(true)
    }

    /// Archive or restore. Archived records lose their reminders.
    pub fn set_archived(
        &mut self,
        id: &str,
        archived: bool,
        scheduler: &mut ReminderScheduler,
        settings: &SettingsState,
        now: NaiveDateTime,
    ) -> Result<ScheduleOutcome, StoreError> {
        self.initialize()?;
        let index = self.position(id)?;
        self.records[index].archived = archived;
        let outcome = scheduler.schedule(&self.records[index], settings, now)?;
        self.persist();
        tracing::info!(prescription_id = id, archived, "Prescription archive flag changed");
        Ok(outcome)
    }

    /// Log a dose. Returns `false` if that timestamp was already recorded.
    pub fn record_taken(&mut self, id: &str, at: NaiveDateTime) -> Result<bool, StoreError> {
        self.initialize()?;
        let index = self.position(id)?;
        let added = self.records[index].mark_taken(at);
        if added {
            self.persist();
        }
        Ok(added)
    }

    /// Flip a dose on or off. Returns whether it is now taken.
    pub fn toggle_taken(&mut self, id: &str, at: NaiveDateTime) -> Result<bool, StoreError> {
        self.initialize()?;
        let index = self.position(id)?;
        let taken = self.records[index].toggle_taken(at);
        self.persist();
        Ok(taken)
    }

    /// Drop every record and its reminders.
    pub fn clear(&mut self, scheduler: &mut ReminderScheduler) -> Result<(), StoreError> {
        self.initialize()?;
        for record in &self.records {
            scheduler.cancel_for(&record.id)?;
        }
        self.records.clear();
        self.persist();
        tracing::info!("All prescriptions cleared");
        Ok(())
    }

    fn position(&self, id: &str) -> Result<usize, StoreError> {
        self.records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Write the list back. Failures are logged; memory stays authoritative.
    fn persist(&self) {
        let mut data = match self.data.lock() {
            Ok(data) => data,
            Err(_) => {
                tracing::error!("User data lock poisoned, prescriptions not saved");
                return;
            }
        };
        let result = data.set(NAMESPACE, &self.records).and_then(|_| data.save());
        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to persist prescriptions");
        }
    }
}
