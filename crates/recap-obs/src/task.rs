//! The OBS capture task variant.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use recap_config::env::resolve_option_from_env;
use recap_cron::task::{ScheduledTask, TaskCore, TaskProp};

use crate::recorder::{ObsError, ObsRecorder, RecorderProp};

const OPT_WEBSOCKET_ADDRESS: &str = "obs_websocket_address";
const OPT_WEBSOCKET_PORT: &str = "obs_websocket_port";
const OPT_WEBSOCKET_PASSWORD: &str = "obs_websocket_password";
const OPT_OBS_PATH: &str = "obs_path";

/// A task whose start/stop effect drives an OBS recording session:
/// launch the process, connect the control socket, record.
#[derive(Default)]
pub struct ObsTask {
    core: TaskCore,
    recorder: Option<Arc<ObsRecorder>>,
}

impl ObsTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// The resolved backend settings, once initialized.
    pub fn recorder_prop(&self) -> Option<&RecorderProp> {
        self.recorder.as_ref().map(|r| r.prop())
    }

    fn resolved_option(&self, key: &str) -> Option<String> {
        let value = self.core.options()?.get(key)?.as_str()?;
        let resolved = resolve_option_from_env(value);
        if resolved.is_none() {
            warn!(task = %self.core.name(), option = key, "Environment variable named by option is not set");
        }
        resolved
    }
}

#[async_trait]
impl ScheduledTask for ObsTask {
    fn init(&mut self, prop: TaskProp) -> anyhow::Result<()> {
        self.core.init(prop);

        let defaults = RecorderProp::default();
        let recorder = Arc::new(ObsRecorder::new(RecorderProp {
            websocket_address: self
                .resolved_option(OPT_WEBSOCKET_ADDRESS)
                .unwrap_or(defaults.websocket_address),
            websocket_port: self
                .resolved_option(OPT_WEBSOCKET_PORT)
                .unwrap_or(defaults.websocket_port),
            websocket_password: self
                .resolved_option(OPT_WEBSOCKET_PASSWORD)
                .unwrap_or(defaults.websocket_password),
            obs_path: self
                .resolved_option(OPT_OBS_PATH)
                .unwrap_or(defaults.obs_path),
        }));

        // Fire-and-forget connection check so registration never blocks on
        // the backend.
        let probe = recorder.clone();
        let name = self.core.name().to_string();
        tokio::spawn(async move {
            if let Err(e) = probe.check_connection().await {
                warn!(task = %name, "OBS connection check failed: {e}");
            }
        });

        self.recorder = Some(recorder);
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        let Some(recorder) = &self.recorder else {
            anyhow::bail!("task {} was never initialized", self.core.name());
        };
        if !self.core.begin_start() {
            return Ok(());
        }

        let outcome = async {
            recorder.start_process().await?;
            recorder.connect().await?;
            recorder.start_recording().await?;
            Ok::<(), ObsError>(())
        }
        .await;

        match outcome {
            Ok(()) => {
                info!(task = %self.core.name(), id = %self.core.id(), "Task started");
                Ok(())
            }
            Err(e) => {
                self.core.abort_start();
                Err(e.into())
            }
        }
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let Some(recorder) = &self.recorder else {
            anyhow::bail!("task {} was never initialized", self.core.name());
        };
        if !self.core.begin_stop() {
            return Ok(());
        }

        match recorder.stop_recording().await {
            Ok(()) => {
                recorder.stop_process().await;
                info!(task = %self.core.name(), id = %self.core.id(), "Task stopped");
                Ok(())
            }
            Err(e) => {
                self.core.abort_stop();
                Err(e.into())
            }
        }
    }

    fn id(&self) -> &str {
        self.core.id()
    }

    fn name(&self) -> &str {
        self.core.name()
    }

    fn cron_start(&self) -> &str {
        self.core.cron_start()
    }

    fn cron_stop(&self) -> Option<&str> {
        self.core.cron_stop()
    }

    fn enabled(&self) -> bool {
        self.core.enabled()
    }

    fn is_running(&self) -> bool {
        self.core.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn prop(enabled: bool, options: HashMap<String, serde_json::Value>) -> TaskProp {
        TaskProp {
            id: "obs-1".to_string(),
            name: "lecture capture".to_string(),
            cron_start: "0 9 * * *".to_string(),
            cron_stop: Some("0 11 * * *".to_string()),
            enabled,
            options,
        }
    }

    #[tokio::test]
    async fn test_init_resolves_literal_options() {
        let options: HashMap<String, serde_json::Value> = [
            (OPT_WEBSOCKET_ADDRESS.to_string(), "ws://10.0.0.7".into()),
            (OPT_WEBSOCKET_PORT.to_string(), "4460".into()),
            (OPT_WEBSOCKET_PASSWORD.to_string(), "hunter2".into()),
            (OPT_OBS_PATH.to_string(), "/opt/obs/bin/obs".into()),
        ]
        .into();

        let mut task = ObsTask::new();
        task.init(prop(true, options)).unwrap();

        let resolved = task.recorder_prop().unwrap();
        assert_eq!(resolved.websocket_address, "ws://10.0.0.7");
        assert_eq!(resolved.websocket_port, "4460");
        assert_eq!(resolved.websocket_password, "hunter2");
        assert_eq!(resolved.obs_path, "/opt/obs/bin/obs");
    }

    #[tokio::test]
    async fn test_init_falls_back_to_defaults() {
        let mut task = ObsTask::new();
        task.init(prop(true, HashMap::new())).unwrap();

        let resolved = task.recorder_prop().unwrap();
        assert_eq!(resolved.websocket_port, "4455");
        assert!(resolved.websocket_password.is_empty());
    }

    #[tokio::test]
    async fn test_start_before_init_fails() {
        let task = ObsTask::new();
        assert!(task.start().await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_task_skips_backend() {
        let options: HashMap<String, serde_json::Value> =
            [(OPT_OBS_PATH.to_string(), "/nonexistent/obs64".into())].into();
        let mut task = ObsTask::new();
        task.init(prop(false, options)).unwrap();

        // Disabled: the guard short-circuits before the backend is touched.
        task.start().await.unwrap();
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn test_failed_start_rolls_back_running_flag() {
        let options: HashMap<String, serde_json::Value> =
            [(OPT_OBS_PATH.to_string(), "/nonexistent/obs64".into())].into();
        let mut task = ObsTask::new();
        task.init(prop(true, options)).unwrap();

        assert!(task.start().await.is_err());
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let mut task = ObsTask::new();
        task.init(prop(true, HashMap::new())).unwrap();

        task.stop().await.unwrap();
        assert!(!task.is_running());
    }
}
