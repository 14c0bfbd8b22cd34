//! Prescription list, edit form and dose logging.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tauri::State;

use crate::adherence::AdherenceSummary;
use crate::core_state::CoreState;
use crate::models::{PrescriptionRecord, PrescriptionStatus, ReminderTime};
use crate::prescriptions::PrescriptionEdit;
use crate::scheduler::ScheduleOutcome;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPrescription {
    pub record: PrescriptionRecord,
    pub reminders: ScheduleOutcome,
}

impl From<(PrescriptionRecord, ScheduleOutcome)> for SavedPrescription {
    fn from((record, reminders): (PrescriptionRecord, ScheduleOutcome)) -> Self {
        Self { record, reminders }
    }
}

#[tauri::command]
pub fn list_prescriptions(
    status: Option<PrescriptionStatus>,
    state: State<'_, Arc<CoreState>>,
) -> Result<Vec<PrescriptionRecord>, String> {
    match status {
        Some(status) => state.prescriptions_with_status(status),
        None => state.prescriptions(),
    }
    .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_prescription(
    id: String,
    state: State<'_, Arc<CoreState>>,
) -> Result<PrescriptionRecord, String> {
    state
        .prescription(&id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Prescription not found: {id}"))
}

#[tauri::command]
pub fn add_prescription(
    record: PrescriptionRecord,
    state: State<'_, Arc<CoreState>>,
) -> Result<SavedPrescription, String> {
    state
        .add_prescription(record)
        .map(SavedPrescription::from)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn update_prescription(
    id: String,
    edit: PrescriptionEdit,
    state: State<'_, Arc<CoreState>>,
) -> Result<SavedPrescription, String> {
    state
        .update_prescription(&id, &edit)
        .map(SavedPrescription::from)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn delete_prescription(id: String, state: State<'_, Arc<CoreState>>) -> Result<bool, String> {
    state.remove_prescription(&id).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn set_prescription_archived(
    id: String,
    archived: bool,
    state: State<'_, Arc<CoreState>>,
) -> Result<ScheduleOutcome, String> {
    state.set_archived(&id, archived).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn remove_reminder_time(
    id: String,
    index: usize,
    state: State<'_, Arc<CoreState>>,
) -> Result<Option<ReminderTime>, String> {
    state.remove_reminder_time(&id, index).map_err(|e| e.to_string())
}

/// Agenda tap on a dose slot. Returns whether the dose is now taken.
#[tauri::command]
pub fn toggle_dose_taken(
    id: String,
    at: NaiveDateTime,
    state: State<'_, Arc<CoreState>>,
) -> Result<bool, String> {
    state.toggle_taken(&id, at).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_adherence(
    id: Option<String>,
    state: State<'_, Arc<CoreState>>,
) -> Result<Vec<AdherenceSummary>, String> {
    match id {
        Some(id) => state
            .adherence(&id)
            .map(|summary| summary.into_iter().collect()),
        None => state.adherence_all(),
    }
    .map_err(|e| e.to_string())
}
