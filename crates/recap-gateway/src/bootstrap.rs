//! Composition: turn config descriptors into registered tasks.
//!
//! Variant selection happens through an explicit name→factory map built by
//! the binary, so this crate never depends on concrete task backends.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Local;
use serde_json::json;
use tracing::{info, warn};

use recap_cron::{ScheduledTask, TaskRegistry, resolve_prop};
use recap_types::{RecordingSchedule, TaskDescriptor};

/// Constructor for one task variant.
pub type TaskFactory = Box<dyn Fn() -> Box<dyn ScheduledTask> + Send + Sync>;

/// Name → constructor map; the closed set of task classes this build knows.
pub type TaskFactoryMap = HashMap<String, TaskFactory>;

/// Reserved id of the legacy singular recording task.
pub const RECORDING_TASK_ID: &str = "recording";

/// Instantiate, init and register every descriptor.
///
/// A descriptor naming an unknown class is reported and skipped; so is one
/// whose registration fails (bad pattern, duplicate id) — one malformed
/// record never aborts startup. Returns how many tasks were registered.
pub async fn register_tasks(
    registry: &TaskRegistry,
    factories: &TaskFactoryMap,
    descriptors: &[TaskDescriptor],
) -> usize {
    let mut registered = 0;
    for descriptor in descriptors {
        match register_descriptor(registry, factories, descriptor).await {
            Ok(()) => registered += 1,
            Err(e) => {
                warn!(task = %descriptor.name, class = %descriptor.class, "Skipping task: {e}");
            }
        }
    }
    registered
}

/// Resolve one descriptor, build its task variant, init it and add it to
/// the registry.
pub async fn register_descriptor(
    registry: &TaskRegistry,
    factories: &TaskFactoryMap,
    descriptor: &TaskDescriptor,
) -> anyhow::Result<()> {
    let factory = factories
        .get(&descriptor.class)
        .ok_or_else(|| anyhow::anyhow!("unknown task class {:?}", descriptor.class))?;

    let prop = resolve_prop(descriptor, Local::now())?;
    info!(
        task = %descriptor.name,
        class = %descriptor.class,
        cron_start = %prop.cron_start,
        "Loading task"
    );

    let mut task = factory();
    task.init(prop)?;
    let task: Arc<dyn ScheduledTask> = Arc::from(task);
    registry.add(task).await?;
    Ok(())
}

/// The legacy singular recording pair as a descriptor: a reserved-id OBS
/// task whose backend settings come from the environment.
pub fn recording_descriptor(schedule: &RecordingSchedule) -> TaskDescriptor {
    TaskDescriptor {
        id: Some(RECORDING_TASK_ID.to_string()),
        name: "Recording".to_string(),
        cron_start: schedule.start.clone(),
        cron_stop: Some(schedule.stop.clone()),
        enabled: true,
        options: [
            (
                "obs_websocket_address".to_string(),
                json!("env:OBS_WEBSOCKET_ADDRESS"),
            ),
            (
                "obs_websocket_port".to_string(),
                json!("env:OBS_WEBSOCKET_PORT"),
            ),
            (
                "obs_websocket_password".to_string(),
                json!("env:OBS_WEBSOCKET_PASSWORD"),
            ),
            ("obs_path".to_string(), json!("env:OBS_PATH")),
        ]
        .into(),
        class: "ObsTask".to_string(),
    }
}
