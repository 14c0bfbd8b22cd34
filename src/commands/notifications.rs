use std::sync::Arc;

use tauri::State;

use crate::core_state::{ActionOutcome, CoreState};
use crate::notifications::{NotificationAction, NotificationData, PermissionStatus};

/// Button press on a shown reminder (`TAKEN_ACTION`, `SNOOZE_ACTION`, `SKIP_ACTION`).
#[tauri::command]
pub fn handle_notification_action(
    action_identifier: String,
    data: NotificationData,
    state: State<'_, Arc<CoreState>>,
) -> Result<ActionOutcome, String> {
    let action = NotificationAction::from_identifier(&action_identifier)
        .ok_or_else(|| format!("Unknown notification action: {action_identifier}"))?;
    state
        .handle_notification_action(action, &data)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_scheduled_notifications(state: State<'_, Arc<CoreState>>) -> Result<Vec<String>, String> {
    state.scheduled_notifications().map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_notification_permission(
    state: State<'_, Arc<CoreState>>,
) -> Result<PermissionStatus, String> {
    state.notification_permission().map_err(|e| e.to_string())
}
