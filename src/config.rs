//! Runtime configuration read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const DEFAULT_POLL_SECS: u64 = 30;
const DEFAULT_REFRESH_MIN_MS: u64 = 500;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TAX_RATE: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Backend base URL, normalized to end in `/api`.
    pub api_url: String,
    /// Local store, logs and chat cache live here.
    pub data_dir: PathBuf,
    /// Generated receipts and reports are written here.
    pub output_dir: PathBuf,
    pub poll_interval: Duration,
    /// Minimum time a manual refresh keeps the loading flag raised.
    pub refresh_min_visible: Duration,
    pub http_timeout: Duration,
    /// Default tax percentage for new bills.
    pub default_tax_rate: f64,
    /// Persist the session in the OS credential store instead of the local db.
    pub use_keyring: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            api_url: crate::api::normalize_api_url(DEFAULT_API_URL),
            output_dir: data_dir.join("documents"),
            data_dir,
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            refresh_min_visible: Duration::from_millis(DEFAULT_REFRESH_MIN_MS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            default_tax_rate: DEFAULT_TAX_RATE,
            use_keyring: true,
        }
    }
}

impl AppConfig {
    /// Build the config from `DINING_*` environment variables. Malformed
    /// values are logged and replaced by their defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(url) = env_str("DINING_API_URL") {
            cfg.api_url = crate::api::normalize_api_url(&url);
        }
        if let Some(dir) = env_str("DINING_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
            cfg.output_dir = cfg.data_dir.join("documents");
        }
        if let Some(dir) = env_str("DINING_OUTPUT_DIR") {
            cfg.output_dir = PathBuf::from(dir);
        }
        if let Some(secs) = env_parse::<u64>("DINING_POLL_SECS").filter(|v| *v > 0) {
            cfg.poll_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("DINING_REFRESH_MIN_MS") {
            cfg.refresh_min_visible = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("DINING_HTTP_TIMEOUT_SECS").filter(|v| *v > 0) {
            cfg.http_timeout = Duration::from_secs(secs);
        }
        if let Some(rate) = env_parse::<f64>("DINING_TAX_RATE").filter(|v| v.is_finite() && *v >= 0.0)
        {
            cfg.default_tax_rate = rate;
        }
        if let Some(flag) = env_str("DINING_USE_KEYRING") {
            cfg.use_keyring = !matches!(
                flag.to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            );
        }

        cfg
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_str(key)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring malformed config value");
            None
        }
    }
}

fn default_data_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("dining-console")
}
