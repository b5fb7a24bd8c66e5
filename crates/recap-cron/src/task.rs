//! Task state machine and the generic task variant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::info;

/// Resolved task configuration, immutable after resolution.
#[derive(Debug, Clone)]
pub struct TaskProp {
    /// Unique task id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Absolute cron pattern that starts the task.
    pub cron_start: String,
    /// Optional absolute cron pattern that stops the task.
    pub cron_stop: Option<String>,
    /// Whether start fires have any effect.
    pub enabled: bool,
    /// Variant-specific settings, consumed only by the concrete variant.
    pub options: HashMap<String, serde_json::Value>,
}

/// Capability set shared by every schedulable task variant.
///
/// `init` configures the task exactly once before it is registered; calling
/// it again overwrites the configuration. The runtime methods take `&self` —
/// implementations keep mutable state behind interior mutability so
/// overlapping trigger fires stay safe.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    /// One-time configuration. Must be called before `start`/`stop` are
    /// meaningful.
    fn init(&mut self, prop: TaskProp) -> anyhow::Result<()>;

    /// Perform the task's effect. No-op unless enabled and not running.
    async fn start(&self) -> anyhow::Result<()>;

    /// Reverse the task's effect. No-op unless running.
    async fn stop(&self) -> anyhow::Result<()>;

    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn cron_start(&self) -> &str;
    fn cron_stop(&self) -> Option<&str>;
    fn enabled(&self) -> bool;
    fn is_running(&self) -> bool;
}

/// Shared base state for task variants: the configured prop plus the running
/// flag.
///
/// The idle→running transition is claimed with a compare-and-set before the
/// variant's backend effect runs, so two trigger fires landing in the same
/// tick cannot both drive the backend; a failed effect rolls the claim back
/// with [`TaskCore::abort_start`].
#[derive(Default)]
pub struct TaskCore {
    prop: Option<TaskProp>,
    running: AtomicBool,
}

impl TaskCore {
    /// Store the configuration and reset the state machine to idle.
    pub fn init(&mut self, prop: TaskProp) {
        self.prop = Some(prop);
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn id(&self) -> &str {
        self.prop.as_ref().map(|p| p.id.as_str()).unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.prop
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("Unnamed Task")
    }

    pub fn cron_start(&self) -> &str {
        self.prop
            .as_ref()
            .map(|p| p.cron_start.as_str())
            .unwrap_or("")
    }

    pub fn cron_stop(&self) -> Option<&str> {
        self.prop.as_ref().and_then(|p| p.cron_stop.as_deref())
    }

    pub fn enabled(&self) -> bool {
        self.prop.as_ref().map(|p| p.enabled).unwrap_or(true)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> Option<&HashMap<String, serde_json::Value>> {
        self.prop.as_ref().map(|p| &p.options)
    }

    /// Claim the idle→running transition. Returns false when the task is
    /// disabled or already running — the repeated-fire no-op path.
    pub fn begin_start(&self) -> bool {
        self.enabled()
            && self
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    /// Roll back a claimed start after the backend effect failed.
    pub fn abort_start(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Claim the running→idle transition. Returns false when not running.
    pub fn begin_stop(&self) -> bool {
        self.running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Roll back a claimed stop after the backend teardown failed.
    pub fn abort_stop(&self) {
        self.running.store(true, Ordering::SeqCst);
    }
}

/// A plain task: the start/stop effect is the logged state transition itself.
#[derive(Default)]
pub struct GenericTask {
    core: TaskCore,
}

impl GenericTask {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduledTask for GenericTask {
    fn init(&mut self, prop: TaskProp) -> anyhow::Result<()> {
        self.core.init(prop);
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        if self.core.begin_start() {
            info!(task = %self.core.name(), id = %self.core.id(), "Task started");
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if self.core.begin_stop() {
            info!(task = %self.core.name(), id = %self.core.id(), "Task stopped");
        }
        Ok(())
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
    use std::sync::Arc;

    fn prop(id: &str, enabled: bool) -> TaskProp {
        TaskProp {
            id: id.to_string(),
            name: format!("task {id}"),
            cron_start: "0 9 * * *".to_string(),
            cron_stop: Some("0 10 * * *".to_string()),
            enabled,
            options: HashMap::new(),
        }
    }

    #[test]
    fn test_uninitialized_defaults() {
        let core = TaskCore::default();
        assert_eq!(core.id(), "");
        assert_eq!(core.name(), "Unnamed Task");
        assert_eq!(core.cron_start(), "");
        assert!(core.cron_stop().is_none());
        assert!(core.enabled());
        assert!(!core.is_running());
    }

    #[tokio::test]
    async fn test_start_stop_transitions() {
        let mut task = GenericTask::new();
        task.init(prop("t1", true)).unwrap();

        assert!(!task.is_running());
        task.start().await.unwrap();
        assert!(task.is_running());

        // Repeated start is idempotent.
        task.start().await.unwrap();
        assert!(task.is_running());

        task.stop().await.unwrap();
        assert!(!task.is_running());

        // Stop without a running task is a no-op.
        task.stop().await.unwrap();
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn test_disabled_task_never_starts() {
        let mut task = GenericTask::new();
        task.init(prop("t2", false)).unwrap();

        task.start().await.unwrap();
        assert!(!task.is_running());
    }

    #[test]
    fn test_reinit_overwrites_and_resets() {
        let mut core = TaskCore::default();
        core.init(prop("old", true));
        assert!(core.begin_start());
        assert!(core.is_running());

        core.init(prop("new", true));
        assert_eq!(core.id(), "new");
        assert!(!core.is_running());
    }

    #[test]
    fn test_abort_start_rolls_back() {
        let mut core = TaskCore::default();
        core.init(prop("t3", true));

        assert!(core.begin_start());
        core.abort_start();
        assert!(!core.is_running());
        assert!(core.begin_start());
    }

    /// Two overlapping starts must claim the running flag exactly once —
    /// this is the guard an unsynchronised check-then-set would fail.
    #[test]
    fn test_overlapping_starts_claim_once() {
        let mut core = TaskCore::default();
        core.init(prop("t4", true));
        let core = Arc::new(core);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let core = core.clone();
                std::thread::spawn(move || core.begin_start())
            })
            .collect();

        let claims: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(claims.iter().filter(|&&claimed| claimed).count(), 1);
        assert!(core.is_running());
    }
}
