use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory annotated images are written to and served from.
    pub output_dir: PathBuf,
    /// Images older than this many days are swept regardless of history.
    pub retention_days: u64,
    /// Capacity of the in-memory detection history.
    pub max_history: usize,
    /// Base URL of the ESP32-CAM peripheral.
    pub esp32_cam_url: String,
    pub port: u16,
    /// Verbose logging.
    pub debug: bool,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    /// Directory containing ONNX model files and the gallery.
    pub model_dir: PathBuf,
    /// Static web assets served at `/`.
    pub web_dir: PathBuf,
    /// TrueType font for box labels; the bundled font when unset.
    pub font_path: Option<PathBuf>,
    /// Period of the background retention sweep.
    pub sweep_interval: Duration,
}

impl Config {
    /// Load configuration from the environment with defaults.
    pub fn from_env() -> Self {
        Self {
            output_dir: env_path("OUTPUT_FOLDER", "Output"),
            retention_days: env_u64("RETENTION_DAYS", 7),
            max_history: env_usize("MAX_HISTORY", 100),
            esp32_cam_url: std::env::var("ESP32_CAM_URL")
                .unwrap_or_else(|_| "http://192.168.4.1".to_string()),
            port: env_u64("PORT", 5000).try_into().unwrap_or(5000),
            debug: env_bool("DEBUG", false),
            telegram_bot_token: env_opt("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: env_opt("TELEGRAM_CHAT_ID"),
            model_dir: env_path("CCTV_MODEL_DIR", "models"),
            web_dir: env_path("CCTV_WEB_DIR", "web"),
            font_path: env_opt("CCTV_FONT_PATH").map(PathBuf::from),
            sweep_interval: Duration::from_secs(env_u64("CCTV_SWEEP_INTERVAL_SECS", 86_400).max(1)),
        }
    }

    /// Default tracing filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_path(key: &str, default: &str) -> PathBuf {
    env_opt(key)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_helpers_fall_back_on_garbage() {
        std::env::set_var("CCTVD_TEST_U64", "not-a-number");
        assert_eq!(env_u64("CCTVD_TEST_U64", 7), 7);
        std::env::set_var("CCTVD_TEST_U64", "12");
        assert_eq!(env_u64("CCTVD_TEST_U64", 7), 12);
        assert_eq!(env_usize("CCTVD_TEST_UNSET_USIZE", 100), 100);
    }

    #[test]
    fn test_env_bool_is_case_insensitive() {
        std::env::set_var("CCTVD_TEST_BOOL", "TRUE");
        assert!(env_bool("CCTVD_TEST_BOOL", false));
        std::env::set_var("CCTVD_TEST_BOOL", "1");
        assert!(!env_bool("CCTVD_TEST_BOOL", false));
    }

    #[test]
    fn test_empty_credentials_are_unset() {
        std::env::set_var("CCTVD_TEST_EMPTY", "");
        assert_eq!(env_opt("CCTVD_TEST_EMPTY"), None);
    }
}
