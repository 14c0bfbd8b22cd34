//! Prescription label extraction.
//!
//! A label photo is posted to a vision model behind a REST endpoint; the
//! model's JSON answer is parsed leniently into drugs, and each drug becomes
//! a prescription record using the user's meal times.

pub mod cancel;
pub mod client;
pub mod parser;
pub mod rate_limit;

pub use cancel::{run_cancellable, CancelRegistry};
pub use client::{ExtractionTransport, HttpExtractionClient, MockExtractionTransport};
pub use parser::{parse_drugs, parse_envelope};
pub use rate_limit::RateLimiter;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    new_prescription_id, unique_reminder_times, FoodTiming, FrequencyPattern, PrescriptionRecord,
    SettingsState,
};

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Session expired, please log in again")]
    Unauthorized,

    #[error("Server error: {status}")]
    Server { status: u16, body: String },

    #[error("Cannot reach extraction service at {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed extraction response: {0}")]
    MalformedResponse(String),

    #[error("Rate limit exceeded. Please try again in {} minutes.", .retry_after_secs.div_ceil(60))]
    RateLimited { retry_after_secs: u64 },

    #[error("No image provided")]
    EmptyImage,
}

impl ExtractionError {
    /// Alert title shown to the user.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Cancelled => "Cancelled",
            Self::Unauthorized => "Session Expired",
            Self::RateLimited { .. } => "Please Wait",
            _ => "Invalid Image",
        }
    }

    /// Alert text. Non-verbose builds hide transport details behind a retry hint.
    pub fn user_message(&self, verbose: bool) -> String {
        match self {
            Self::Cancelled => "The operation was cancelled.".to_string(),
            Self::Unauthorized => {
                "Your session has expired. Please login again to use photo features.".to_string()
            }
            Self::RateLimited { .. } => self.to_string(),
            _ if verbose => self.to_string(),
            _ => "Please try again!".to_string(),
        }
    }
}

/// Body posted to the extraction endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub base64: String,
}

impl ExtractionRequest {
    /// Encode raw image bytes as a data URL.
    pub fn from_image(bytes: &[u8], mime: Option<&str>) -> Result<Self, ExtractionError> {
        if bytes.is_empty() {
            return Err(ExtractionError::EmptyImage);
        }
        let mime = mime.unwrap_or(DEFAULT_IMAGE_MIME);
        Ok(Self {
            base64: format!("data:{mime};base64,{}", STANDARD.encode(bytes)),
        })
    }

    /// Wrap already-encoded image data; bare base64 is given a JPEG data URL prefix.
    pub fn from_base64(encoded: &str) -> Result<Self, ExtractionError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(ExtractionError::EmptyImage);
        }
        let base64 = if encoded.starts_with("data:") {
            encoded.to_string()
        } else {
            format!("data:{DEFAULT_IMAGE_MIME};base64,{encoded}")
        };
        Ok(Self { base64 })
    }
}

/// One drug as read from the model output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedDrug {
    pub name: String,
    pub dosage: String,
    pub kind: String,
    pub food: FoodTiming,
    pub route: String,
    /// `b-l-d` meal flags, e.g. `1-0-1`.
    pub frequency: String,
    pub days: i64,
}

impl ExtractedDrug {
    /// Record starting now and lasting `days`, with reminders at the flagged meals.
    pub fn to_record(&self, settings: &SettingsState, now: NaiveDateTime) -> PrescriptionRecord {
        let end_at = Duration::try_days(self.days.max(0))
            .and_then(|span| now.checked_add_signed(span))
            .unwrap_or(now);
        let times = settings.reminder_times_for(&FrequencyPattern::parse_or_lenient(&self.frequency));

        PrescriptionRecord {
            id: new_prescription_id(),
            name: self.name.clone(),
            dosage: self.dosage.clone(),
            kind: self.kind.clone(),
            food: self.food,
            reminder_times: unique_reminder_times(&times),
            taken: Vec::new(),
            start_at: now,
            end_at,
            archived: false,
        }
    }
}

/// Result of one extraction, ready for the alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionOutcome {
    pub title: String,
    pub message: String,
    pub records: Vec<PrescriptionRecord>,
}

impl ExtractionOutcome {
    pub fn new(records: Vec<PrescriptionRecord>) -> Self {
        let (title, message) = if records.is_empty() {
            ("Invalid Image".to_string(), "Fail to extract any medication!".to_string())
        } else {
            (
                "Succeed".to_string(),
                format!(
                    "In total of {} medication(s) has been extracted. Please double-check the identified medication(s)!",
                    records.len()
                ),
            )
        };
        Self {
            title,
            message,
            records,
        }
    }

    /// Alert for a failed extraction; nothing was added.
    pub fn failed(error: &ExtractionError, verbose: bool) -> Self {
        Self {
            title: error.title().to_string(),
            message: error.user_message(verbose),
            records: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 10)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn drug(frequency: &str, days: i64) -> ExtractedDrug {
        ExtractedDrug {
            name: "Amoxicillin".into(),
            dosage: "500mg".into(),
            kind: "capsule".into(),
            food: FoodTiming::AfterFood,
            route: "oral".into(),
            frequency: frequency.into(),
            days,
        }
    }

    #[test]
    fn drug_becomes_record_with_meal_times() {
        let record = drug("1-0-1", 7).to_record(&SettingsState::default(), now());
        assert_eq!(record.start_at, now());
        assert_eq!(record.end_at, now() + Duration::days(7));
        assert_eq!(record.reminder_times.len(), 2);
        assert_eq!(record.reminder_times[0].label, "Breakfast");
        assert_eq!(record.reminder_times[1].label, "Dinner");
        assert_eq!(record.food, FoodTiming::AfterFood);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn negative_days_collapse_to_today() {
        let record = drug("0-1-0", -3).to_record(&SettingsState::default(), now());
        assert_eq!(record.end_at, now());
    }

    #[test]
    fn each_record_gets_its_own_id() {
        let settings = SettingsState::default();
        let a = drug("1-1-1", 1).to_record(&settings, now());
        let b = drug("1-1-1", 1).to_record(&settings, now());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn request_from_bytes_is_a_data_url() {
        let req = ExtractionRequest::from_image(b"abc", Some("image/png")).unwrap();
        assert_eq!(req.base64, "data:image/png;base64,YWJj");
        assert!(matches!(
            ExtractionRequest::from_image(&[], None),
            Err(ExtractionError::EmptyImage)
        ));
    }

    #[test]
    fn bare_base64_gets_jpeg_prefix() {
        let req = ExtractionRequest::from_base64("YWJj").unwrap();
        assert_eq!(req.base64, "data:image/jpeg;base64,YWJj");
        let kept = ExtractionRequest::from_base64("data:image/png;base64,YWJj").unwrap();
        assert_eq!(kept.base64, "data:image/png;base64,YWJj");
    }

    #[test]
    fn outcome_messages() {
        let empty = ExtractionOutcome::new(Vec::new());
        assert_eq!(empty.message, "Fail to extract any medication!");
        let one = ExtractionOutcome::new(vec![drug("1-0-0", 1).to_record(&SettingsState::default(), now())]);
        assert_eq!(one.title, "Succeed");
        assert!(one.message.starts_with("In total of 1 medication(s) has been extracted."));
    }

    #[test]
    fn failed_outcome_uses_error_alert() {
        let outcome = ExtractionOutcome::failed(&ExtractionError::Unauthorized, false);
        assert_eq!(outcome.title, "Session Expired");
        assert!(outcome.records.is_empty());
        let outcome = ExtractionOutcome::failed(&ExtractionError::Network("reset".into()), false);
        assert_eq!(outcome.message, "Please try again!");
    }

    #[test]
    fn user_messages_hide_details_unless_verbose() {
        let err = ExtractionError::Server {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.user_message(false), "Please try again!");
        assert_eq!(err.user_message(true), "Server error: 500");
        assert_eq!(ExtractionError::Cancelled.title(), "Cancelled");
        assert_eq!(ExtractionError::Cancelled.user_message(true), "The operation was cancelled.");
        let limited = ExtractionError::RateLimited { retry_after_secs: 61 };
        assert_eq!(
            limited.user_message(false),
            "Rate limit exceeded. Please try again in 2 minutes."
        );
    }
}
