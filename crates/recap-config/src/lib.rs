pub mod env;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use recap_types::{RecordingSchedule, TaskDescriptor};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    6000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Top-level recap configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecapConfig {
    /// HTTP server config.
    #[serde(default)]
    pub server: ServerConfig,
    /// Declarative task list registered at startup.
    #[serde(default)]
    pub tasks: Vec<TaskDescriptor>,
    /// Legacy singular recording schedule (one start/stop cron pair).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording: Option<RecordingSchedule>,
}

/// Resolve the recap config directory (~/.recap/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".recap"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.recap/schedules.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("schedules.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<RecapConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<RecapConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(RecapConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: RecapConfig = json5::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a specific path, creating parent directories as needed.
pub fn save_config_to(config: &RecapConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Io(std::io::Error::other(e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecapConfig::default();
        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.tasks.is_empty());
        assert!(config.recording.is_none());
    }

    #[test]
    fn test_json5_parse() {
        let json5_str = r#"{
            server: { port: 8080 },
            tasks: [
                {
                    name: "morning capture",
                    cron_start: "0 9 * * *",
                    cron_stop: "0 11 * * *",
                    class: "ObsTask",
                    options: { obs_websocket_port: "4455" },
                },
            ],
        }"#;
        let config: RecapConfig = json5::from_str(json5_str).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tasks.len(), 1);
        assert_eq!(config.tasks[0].class, "ObsTask");
        assert!(config.tasks[0].enabled);
    }

    #[test]
    fn test_json5_parse_with_recording() {
        let json5_str = r#"{
            recording: { start: "0 22 * * *", stop: "0 23 * * *" },
        }"#;
        let config: RecapConfig = json5::from_str(json5_str).unwrap();
        let rec = config.recording.unwrap();
        assert_eq!(rec.start, "0 22 * * *");
        assert_eq!(rec.stop, "0 23 * * *");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join(format!("recap-config-test-{}", std::process::id()));
        let path = dir.join("schedules.json5");
        let mut config = RecapConfig::default();
        config.recording = Some(RecordingSchedule {
            start: "0 8 * * *".to_string(),
            stop: "30 8 * * *".to_string(),
        });

        save_config_to(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.recording.unwrap().start, "0 8 * * *");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
