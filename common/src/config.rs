use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    courier_err,
    protocol::Priority,
    utils::{
        errors::{CourierError, CourierErrorKind},
        paths::get_config_dir,
    },
};

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Unix socket shared by the bridge and the daemon.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Application name reported to the notification server.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Icon used whenever a page icon cannot be resolved. Either an icon
    /// theme name or an absolute path.
    #[serde(default = "default_icon")]
    pub default_icon: String,

    /// Generated-id correlation entries older than this are swept.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default)]
    pub priority: Priority,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            app_name: default_app_name(),
            default_icon: default_icon(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            priority: Priority::default(),
        }
    }
}
impl Config {
    /// Loads `$XDG_CONFIG_HOME/courier/config.json`, falling back to the
    /// defaults when no file exists.
    pub fn load() -> Result<Self, CourierError> {
        let path = get_config_dir()?.join(CONFIG_FILE);
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, CourierError> {
        let file =
            File::open(path).map_err(|e| courier_err!(CourierErrorKind::FileRead, e.to_string()))?;
        let reader = BufReader::new(file);

        serde_json::from_reader::<_, Self>(reader).map_err(|e| {
            courier_err!(
                CourierErrorKind::Deserialize,
                "{}: {}",
                path.display(),
                e.to_string()
            )
        })
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        // tokio::time::interval panics on a zero period
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/courier.sock")
}
fn default_app_name() -> String {
    "Courier".into()
}
fn default_icon() -> String {
    "web-browser".into()
}
fn default_retention_secs() -> u64 {
    60 * 60
}
fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/courier.sock"));
        assert_eq!(config.default_icon, "web-browser");
        assert_eq!(config.retention(), Duration::from_secs(3600));
        assert_eq!(config.priority, Priority::Normal);
    }

    #[test]
    fn test_partial_override() {
        let config: Config =
            serde_json::from_str(r#"{"retention_secs": 10, "priority": "critical"}"#).unwrap();
        assert_eq!(config.retention(), Duration::from_secs(10));
        assert_eq!(config.priority, Priority::Critical);
        assert_eq!(config.app_name, "Courier", "untouched keys keep defaults");
    }

    #[test]
    fn test_zero_sweep_interval_is_clamped() {
        let config: Config = serde_json::from_str(r#"{"sweep_interval_secs": 0}"#).unwrap();
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }
}
