pub mod enums;
pub mod prescription;
pub mod settings;

pub use enums::*;
pub use prescription::*;
pub use settings::*;

use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ModelError {
    #[error("Invalid reminder time {hours}:{minutes:02}")]
    InvalidReminderTime { hours: u32, minutes: u32 },

    #[error("Start {start} is after end {end}")]
    InvalidDateRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("Invalid frequency pattern: {0}")]
    InvalidFrequency(String),
}
