//! Tauri IPC commands. Thin wrappers over `CoreState`; errors reach the
//! frontend as strings.

pub mod calendar;
pub mod extraction;
pub mod notifications;
pub mod prescriptions;
pub mod settings;

use std::sync::Arc;

use tauri::State;

use crate::core_state::CoreState;

/// Health check IPC command, verifies the backend is running
#[tauri::command]
pub fn health_check() -> String {
    tracing::debug!("Health check called");
    "ok".to_string()
}

/// Whether the stores have loaded (the UI waits on this before rendering).
#[tauri::command]
pub fn is_ready(state: State<'_, Arc<CoreState>>) -> bool {
    state.is_ready()
}
