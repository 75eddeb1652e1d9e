// Runtime configuration from environment variables.
//
// Binaries call `dotenvy` first so a local `.env.local` can fill the
// environment; resolution itself never touches the process environment.

use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "fee_registry.db";
pub const DEFAULT_SCHEDULE_PATH: &str = "config/fee_schedule.json";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub schedule_path: PathBuf,
    pub bind_addr: String,
    /// Size of the "recent students" list
    pub recent_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            schedule_path: PathBuf::from(DEFAULT_SCHEDULE_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }
}

impl AppConfig {
    /// Load `.env.local` (if any), then read the process environment
    pub fn from_env() -> Self {
        dotenvy::from_filename(".env.local").ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_path = value("DATABASE_URL")
            .and_then(|url| sqlite_path(&url))
            .or_else(|| value("FEE_REGISTRY_DB").map(PathBuf::from))
            .unwrap_or(defaults.database_path);

        let schedule_path = value("FEE_SCHEDULE")
            .map(PathBuf::from)
            .unwrap_or(defaults.schedule_path);

        let bind_addr = value("FEE_REGISTRY_ADDR").unwrap_or(defaults.bind_addr);

        let recent_limit = value("FEE_REGISTRY_RECENT")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.recent_limit);

        AppConfig {
            database_path,
            schedule_path,
            bind_addr,
            recent_limit,
        }
    }
}

/// `sqlite://path` or `sqlite:path` → path. Other schemes are ignored.
fn sqlite_path(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;

    if rest.is_empty() {
        None
    } else {
        Some(PathBuf::from(rest))
    }
}
