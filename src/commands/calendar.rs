use std::sync::Arc;

use chrono::NaiveDate;
use tauri::State;

use crate::calendar::{AgendaEntry, MarkedDates};
use crate::core_state::CoreState;

/// Multi-dot marks for every day covered by a non-archived prescription.
#[tauri::command]
pub fn get_calendar_marks(state: State<'_, Arc<CoreState>>) -> Result<MarkedDates, String> {
    state.calendar_marks().map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_day_agenda(
    day: NaiveDate,
    state: State<'_, Arc<CoreState>>,
) -> Result<Vec<AgendaEntry>, String> {
    state.day_agenda(day).map_err(|e| e.to_string())
}
