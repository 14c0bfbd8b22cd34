use std::sync::Arc;

use tauri::State;

use crate::core_state::CoreState;
use crate::models::{MealSlot, ReminderTime, SettingsState};

#[tauri::command]
pub fn get_settings(state: State<'_, Arc<CoreState>>) -> Result<SettingsState, String> {
    state.settings().map_err(|e| e.to_string())
}

/// Returns the interval actually stored (never below the floor).
#[tauri::command]
pub fn set_snooze_time(minutes: u32, state: State<'_, Arc<CoreState>>) -> Result<u32, String> {
    state.set_snooze_minutes(minutes).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn set_notifications_enabled(
    enabled: bool,
    state: State<'_, Arc<CoreState>>,
) -> Result<usize, String> {
    state.set_notifications_enabled(enabled).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn set_meal_time(
    slot: MealSlot,
    time: ReminderTime,
    state: State<'_, Arc<CoreState>>,
) -> Result<SettingsState, String> {
    state.set_meal_time(slot, time).map_err(|e| e.to_string())
}

/// Reminder times for a `"1-0-1"` style frequency at the current meal times.
#[tauri::command]
pub fn reminder_times_for_frequency(
    frequency: String,
    state: State<'_, Arc<CoreState>>,
) -> Result<Vec<ReminderTime>, String> {
    state.reminder_times_for(&frequency).map_err(|e| e.to_string())
}
