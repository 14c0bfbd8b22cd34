use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Dosewise";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Overrides the data directory (tests, portable installs).
pub const DATA_DIR_ENV: &str = "DOSEWISE_DATA_DIR";
/// Overrides the label extraction endpoint.
pub const EXTRACT_URL_ENV: &str = "DOSEWISE_EXTRACT_URL";
/// Optional bearer token sent with extraction requests.
pub const EXTRACT_TOKEN_ENV: &str = "DOSEWISE_EXTRACT_TOKEN";

pub const DEFAULT_EXTRACT_URL: &str = "http://localhost:5065/api/ollama/extract";

/// File holding every persisted namespace.
pub const USER_DATA_FILE: &str = "userData.json";

/// Rate limiter key for label extraction.
pub const EXTRACT_RATE_LIMIT_KEY: &str = "extract";

/// Get the application data directory.
///
/// `$DOSEWISE_DATA_DIR` when set, else the platform data dir, else the
/// working directory.
pub fn app_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the user data file path
pub fn user_data_path() -> PathBuf {
    app_data_dir().join(USER_DATA_FILE)
}

pub fn extraction_url() -> String {
    std::env::var(EXTRACT_URL_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EXTRACT_URL.to_string())
}

pub fn extraction_token() -> Option<String> {
    std::env::var(EXTRACT_TOKEN_ENV).ok().filter(|v| !v.is_empty())
}

/// Detailed error text in alerts only for debug builds.
pub fn verbose_errors() -> bool {
    cfg!(debug_assertions)
}

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,dosewise_lib=debug"
    } else {
        "warn,dosewise_lib=info"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_data_file_under_app_data() {
        let path = user_data_path();
        assert!(path.starts_with(app_data_dir()));
        assert!(path.ends_with(USER_DATA_FILE));
    }

    #[test]
    fn app_name_is_dosewise() {
        assert_eq!(APP_NAME, "Dosewise");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.3.0");
    }

    #[test]
    fn log_filter_names_the_crate() {
        assert!(default_log_filter().contains("dosewise_lib"));
    }

    #[test]
    fn extraction_url_has_a_default() {
        if std::env::var_os(EXTRACT_URL_ENV).is_none() {
            assert_eq!(extraction_url(), DEFAULT_EXTRACT_URL);
        }
    }
}
