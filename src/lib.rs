pub mod adherence;
pub mod calendar;
#[cfg(feature = "shell")]
pub mod commands;
pub mod config;
pub mod core_state; // Transport-agnostic state
pub mod extraction;
pub mod models;
pub mod notifications;
pub mod prescriptions;
pub mod scheduler;
pub mod settings;
pub mod storage;

use tracing_subscriber::EnvFilter;

/// Event emitted to the frontend when a reminder fires.
pub const REMINDER_EVENT: &str = "medication-reminder";

/// Install the global subscriber. `RUST_LOG` wins over the build default.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

#[cfg(feature = "shell")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;
    use tauri::{Emitter, Manager};

    init_tracing();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let state = Arc::new(core_state::CoreState::new());

    let result = tauri::Builder::default()
        .manage(state.clone())
        .setup(move |app| {
            if let Err(e) = state.initialize() {
                tracing::error!(error = %e, "Failed to initialize core state");
            }

            let poll_state = state.clone();
            let handle = app.handle().clone();
            let dispatcher = notifications::dispatcher::start_dispatcher(
                notifications::dispatcher::POLL_INTERVAL,
                move || match poll_state.take_due_notifications() {
                    Ok(due) => due,
                    Err(e) => {
                        tracing::error!(error = %e, "Reminder poll failed");
                        Vec::new()
                    }
                },
                move |notification| {
                    if let Err(e) = handle.emit(REMINDER_EVENT, &notification) {
                        tracing::warn!(error = %e, "Failed to emit reminder");
                    }
                },
            );
            app.manage(dispatcher);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::health_check,
            commands::is_ready,
            commands::prescriptions::list_prescriptions,
            commands::prescriptions::get_prescription,
            commands::prescriptions::add_prescription,
            commands::prescriptions::update_prescription,
            commands::prescriptions::delete_prescription,
            commands::prescriptions::set_prescription_archived,
            commands::prescriptions::remove_reminder_time,
            commands::prescriptions::toggle_dose_taken,
            commands::prescriptions::get_adherence,
            commands::settings::get_settings,
            commands::settings::set_snooze_time,
            commands::settings::set_notifications_enabled,
            commands::settings::set_meal_time,
            commands::settings::reminder_times_for_frequency,
            commands::calendar::get_calendar_marks,
            commands::calendar::get_day_agenda,
            commands::notifications::handle_notification_action,
            commands::notifications::get_scheduled_notifications,
            commands::notifications::get_notification_permission,
            commands::extraction::extract_prescriptions,
            commands::extraction::cancel_extractions,
            commands::extraction::get_extraction_remaining_calls,
        ])
        .run(tauri::generate_context!());

    if let Err(e) = result {
        tracing::error!(error = %e, "Error while running application");
    }
}
