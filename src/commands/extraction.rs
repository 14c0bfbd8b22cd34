//! Label photo extraction.
//!
//! Failures come back as an alert-ready outcome rather than an `Err`, so the
//! frontend shows the same dialog either way.

use std::sync::Arc;

use tauri::State;

use crate::config;
use crate::core_state::{CoreError, CoreState};
use crate::extraction::{ExtractionOutcome, ExtractionRequest};

#[tauri::command]
pub async fn extract_prescriptions(
    image_base64: String,
    state: State<'_, Arc<CoreState>>,
) -> Result<ExtractionOutcome, String> {
    let state = state.inner().clone();
    let verbose = config::verbose_errors();

    let result: Result<ExtractionOutcome, CoreError> = async {
        let request = ExtractionRequest::from_base64(&image_base64)?;
        let client = state.extraction_client()?;
        state.extract_prescriptions(&client, &request).await
    }
    .await;

    match result {
        Ok(outcome) => Ok(outcome),
        Err(CoreError::Extraction(e)) => {
            tracing::warn!(error = %e, "Extraction failed");
            Ok(ExtractionOutcome::failed(&e, verbose))
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Cancel every in-flight extraction. Returns how many were cancelled.
#[tauri::command]
pub fn cancel_extractions(state: State<'_, Arc<CoreState>>) -> usize {
    state.cancel_extractions()
}

#[tauri::command]
pub fn get_extraction_remaining_calls(state: State<'_, Arc<CoreState>>) -> usize {
    state.extraction_remaining_calls()
}
