pub mod user_data;

pub use user_data::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UserDataError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot persist {path}: {reason}")]
    Persist { path: PathBuf, reason: String },
}
