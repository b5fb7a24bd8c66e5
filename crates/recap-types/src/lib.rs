use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A declarative task record as it appears in the config file.
///
/// `class` selects which task variant to instantiate at bootstrap;
/// everything else is handed to the scheduler after resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Stable task id. Generated if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name for this task.
    pub name: String,
    /// Cron expression that starts the task, or a relative `check:<N>` form.
    pub cron_start: String,
    /// Optional cron expression that stops the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_stop: Option<String>,
    /// Whether the task's triggers should fire.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Variant-specific settings (e.g. websocket address, binary path).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub options: HashMap<String, serde_json::Value>,
    /// Task variant name (e.g. "Task", "ObsTask").
    pub class: String,
}

fn default_true() -> bool {
    true
}

/// The legacy singular recording schedule: one start/stop cron pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSchedule {
    /// Cron expression that starts the recording.
    pub start: String,
    /// Cron expression that stops the recording.
    pub stop: String,
}

/// JSON body returned by the recording API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}
