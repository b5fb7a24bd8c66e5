//! Task registry — owns tasks and the cron triggers bound to them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::SchedulerError;
use crate::task::ScheduledTask;
use crate::trigger::{CronTrigger, FireHandler};

/// A registered task together with the triggers the registry owns for it.
///
/// The task never holds a reference to its own triggers; the registry is
/// their exclusive owner.
struct CronJob {
    task: Arc<dyn ScheduledTask>,
    start: CronTrigger,
    stop: Option<CronTrigger>,
}

/// The task lifecycle manager: a mapping from task id to its registered
/// [`CronJob`].
///
/// The registry has no background activity of its own — task state only
/// changes when a trigger fires or a caller drives a task directly.
/// Construct one instance and pass it to whatever composes the system.
pub struct TaskRegistry {
    jobs: RwLock<HashMap<String, CronJob>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a task and arm its schedule triggers.
    ///
    /// Creates a start trigger bound to `task.start()` and, when the task
    /// carries a stop pattern, a stop trigger bound to `task.stop()`. Both
    /// begin armed. Fails with [`SchedulerError::DuplicateTaskId`] if the id
    /// is already registered and [`SchedulerError::InvalidSchedulePattern`]
    /// if either pattern does not parse.
    pub async fn add(&self, task: Arc<dyn ScheduledTask>) -> Result<(), SchedulerError> {
        let id = task.id().to_string();
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&id) {
            return Err(SchedulerError::DuplicateTaskId(id));
        }

        info!(
            task = %task.name(),
            id = %id,
            cron_start = %task.cron_start(),
            cron_stop = task.cron_stop().unwrap_or("-"),
            "Registering task"
        );

        let start = CronTrigger::new(task.cron_start(), start_handler(task.clone()))?;
        let stop = match task.cron_stop() {
            Some(pattern) => match CronTrigger::new(pattern, stop_handler(task.clone())) {
                Ok(trigger) => Some(trigger),
                Err(e) => {
                    // Don't leak an armed start trigger for a task that
                    // never makes it into the map.
                    start.stop();
                    start.destroy();
                    return Err(e);
                }
            },
            None => None,
        };

        jobs.insert(id, CronJob { task, start, stop });
        Ok(())
    }

    /// Unregister a task, disposing both of its triggers.
    ///
    /// Triggers are disarmed before disposal so no fire event races the
    /// teardown. Fails with [`SchedulerError::UnknownTaskId`] if absent.
    pub async fn remove(&self, id: &str) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .remove(id)
            .ok_or_else(|| SchedulerError::UnknownTaskId(id.to_string()))?;

        job.start.stop();
        if let Some(stop) = &job.stop {
            stop.stop();
        }
        job.start.destroy();
        if let Some(stop) = &job.stop {
            stop.destroy();
        }

        info!(task = %job.task.name(), id, "Task removed");
        Ok(())
    }

    /// Arm every registered trigger.
    ///
    /// This re-activates the schedules only; it does not invoke
    /// `task.start()` — a task begins running when its armed trigger next
    /// fires.
    pub async fn start_all(&self) {
        let jobs = self.jobs.read().await;
        for job in jobs.values() {
            job.start.start();
            if let Some(stop) = &job.stop {
                stop.start();
            }
        }
    }

    /// Disarm every registered trigger without touching task state.
    pub async fn stop_all(&self) {
        let jobs = self.jobs.read().await;
        for job in jobs.values() {
            job.start.stop();
            if let Some(stop) = &job.stop {
                stop.stop();
            }
        }
    }

    /// Dispose every trigger while keeping the entries lookupable (inert
    /// until re-added or the registry is torn down).
    pub async fn destroy_all(&self) {
        let jobs = self.jobs.read().await;
        for job in jobs.values() {
            job.start.destroy();
            if let Some(stop) = &job.stop {
                stop.destroy();
            }
        }
    }

    /// Look up a task by id.
    pub async fn get_by_id(&self, id: &str) -> Option<Arc<dyn ScheduledTask>> {
        self.jobs.read().await.get(id).map(|job| job.task.clone())
    }

    /// All registered tasks, in no guaranteed order.
    pub async fn get_all(&self) -> Vec<Arc<dyn ScheduledTask>> {
        self.jobs
            .read()
            .await
            .values()
            .map(|job| job.task.clone())
            .collect()
    }

    /// Composite shutdown: disarm all triggers, dispose them, clear the map.
    /// Safe to call more than once.
    pub async fn destroy(&self) {
        self.stop_all().await;
        self.destroy_all().await;
        self.jobs.write().await.clear();
        info!("Task registry destroyed");
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn start_handler(task: Arc<dyn ScheduledTask>) -> FireHandler {
    Arc::new(move || {
        let task = task.clone();
        Box::pin(async move {
            if let Err(e) = task.start().await {
                warn!(task = %task.name(), id = %task.id(), "Scheduled start failed: {e}");
            }
        })
    })
}

fn stop_handler(task: Arc<dyn ScheduledTask>) -> FireHandler {
    Arc::new(move || {
        let task = task.clone();
        Box::pin(async move {
            if let Err(e) = task.stop().await {
                warn!(task = %task.name(), id = %task.id(), "Scheduled stop failed: {e}");
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{GenericTask, ScheduledTask, TaskProp};
    use std::collections::HashMap;
    use std::time::Duration;

    // A pattern that will not fire during any test run.
    const FAR_AWAY: &str = "0 0 1 1 *";

    fn make_task(id: &str, cron_start: &str, cron_stop: Option<&str>) -> Arc<dyn ScheduledTask> {
        let mut task = GenericTask::new();
        task.init(TaskProp {
            id: id.to_string(),
            name: format!("task {id}"),
            cron_start: cron_start.to_string(),
            cron_stop: cron_stop.map(str::to_string),
            enabled: true,
            options: HashMap::new(),
        })
        .unwrap();
        Arc::new(task)
    }

    #[tokio::test]
    async fn test_add_distinct_ids() {
        let registry = TaskRegistry::new();
        for id in ["a", "b", "c"] {
            registry.add(make_task(id, FAR_AWAY, None)).await.unwrap();
        }
        assert_eq!(registry.get_all().await.len(), 3);
        registry.destroy().await;
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let registry = TaskRegistry::new();
        registry
            .add(make_task("t1", FAR_AWAY, Some(FAR_AWAY)))
            .await
            .unwrap();

        let err = registry
            .add(make_task("t1", FAR_AWAY, None))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateTaskId(id) if id == "t1"));

        // The existing entry is untouched.
        let all = registry.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].cron_stop(), Some(FAR_AWAY));
        registry.destroy().await;
    }

    #[tokio::test]
    async fn test_invalid_pattern_rejected_on_add() {
        let registry = TaskRegistry::new();
        let err = registry
            .add(make_task("bad", "every once in a while", None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidSchedulePattern { .. }
        ));
        assert!(registry.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_stop_pattern_rejected_on_add() {
        let registry = TaskRegistry::new();
        let err = registry
            .add(make_task("bad", FAR_AWAY, Some("nope")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidSchedulePattern { .. }
        ));
        assert!(registry.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_id() {
        let registry = TaskRegistry::new();
        registry.add(make_task("t1", FAR_AWAY, None)).await.unwrap();

        let err = registry.remove("ghost").await.unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownTaskId(id) if id == "ghost"));
        assert_eq!(registry.get_all().await.len(), 1);
        registry.destroy().await;
    }

    #[tokio::test]
    async fn test_remove_disposes_entry() {
        let registry = TaskRegistry::new();
        registry
            .add(make_task("t1", FAR_AWAY, Some(FAR_AWAY)))
            .await
            .unwrap();

        registry.remove("t1").await.unwrap();
        assert!(registry.get_by_id("t1").await.is_none());
        assert!(registry.get_all().await.is_empty());

        // The id is free for re-registration.
        registry.add(make_task("t1", FAR_AWAY, None)).await.unwrap();
        registry.destroy().await;
    }

    #[tokio::test]
    async fn test_destroy_twice_is_safe() {
        let registry = TaskRegistry::new();
        registry.add(make_task("t1", FAR_AWAY, None)).await.unwrap();

        registry.destroy().await;
        assert!(registry.get_all().await.is_empty());
        registry.destroy().await;
        assert!(registry.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_all_keeps_entries() {
        let registry = TaskRegistry::new();
        registry.add(make_task("t1", FAR_AWAY, None)).await.unwrap();

        registry.destroy_all().await;
        assert!(registry.get_by_id("t1").await.is_some());
        registry.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_trigger_fire_starts_task() {
        let registry = TaskRegistry::new();
        registry
            .add(make_task("t1", "* * * * * *", None))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        let task = registry.get_by_id("t1").await.unwrap();
        assert!(task.is_running());

        registry.remove("t1").await.unwrap();
        assert!(registry.get_by_id("t1").await.is_none());
        registry.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_trigger_fire_stops_task() {
        let registry = TaskRegistry::new();
        let task = make_task("t1", FAR_AWAY, Some("* * * * * *"));
        registry.add(task.clone()).await.unwrap();

        // Drive the task running by hand; the armed stop trigger should
        // bring it back to idle.
        task.start().await.unwrap();
        assert!(task.is_running());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!task.is_running());
        registry.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_disarms_schedules() {
        let registry = TaskRegistry::new();
        registry
            .add(make_task("t1", "* * * * * *", None))
            .await
            .unwrap();

        registry.stop_all().await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        let task = registry.get_by_id("t1").await.unwrap();
        // Disarming the schedule does not start or stop anything.
        assert!(!task.is_running());

        registry.start_all().await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(task.is_running());
        registry.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fires_after_remove() {
        let registry = TaskRegistry::new();
        let task = make_task("t1", "* * * * * *", None);
        registry.add(task.clone()).await.unwrap();
        registry.remove("t1").await.unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!task.is_running());
    }
}
