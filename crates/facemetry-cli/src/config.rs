use facemetry_core::MetricGroup;
use std::path::PathBuf;
use std::time::Duration;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Remote registration endpoint (multipart POST).
    pub endpoint: String,
    /// Session identifier sent as `userId`.
    pub user_id: String,
    /// Path to the SQLite database holding the pending snapshot.
    pub db_path: PathBuf,
    /// Optional calibration TOML replacing the built-in table.
    pub calibration: Option<PathBuf>,
    /// Metric groups to compute. Empty means all.
    pub groups: Vec<MetricGroup>,
    /// Per-request upload timeout.
    pub upload_timeout: Duration,
}

impl Config {
    /// Load configuration from `FACEMETRY_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facemetry");

        let db_path = std::env::var("FACEMETRY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("queue.db"));

        let groups = std::env::var("FACEMETRY_GROUPS")
            .map(|v| parse_groups(&v))
            .unwrap_or_default();

        Self {
            endpoint: std::env::var("FACEMETRY_ENDPOINT")
                .unwrap_or_else(|_| "http://127.0.0.1:8080/api/register".to_string()),
            user_id: std::env::var("FACEMETRY_USER_ID")
                .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
            db_path,
            calibration: std::env::var("FACEMETRY_CALIBRATION").ok().map(PathBuf::from),
            groups,
            upload_timeout: Duration::from_secs(env_u64("FACEMETRY_UPLOAD_TIMEOUT_SECS", 30)),
        }
    }
}

/// Comma-separated group names. Unknown names are logged and skipped.
pub fn parse_groups(value: &str) -> Vec<MetricGroup> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(group) => Some(group),
            Err(e) => {
                tracing::warn!(group = s, error = %e, "ignoring metric group");
                None
            }
        })
        .collect()
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
