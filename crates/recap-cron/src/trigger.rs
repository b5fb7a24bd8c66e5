//! Cron trigger — a calendar alarm with an armed/disarmed/disposed lifecycle.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use cron::Schedule;
use tokio_util::sync::CancellationToken;

use crate::SchedulerError;

/// Async handler invoked each time the schedule matches.
pub type FireHandler = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A single cron-driven alarm.
///
/// Created armed; `stop` suppresses fires without tearing down the timer,
/// `start` re-arms, `destroy` disposes the timer task permanently. Each fire
/// runs the handler as an independently spawned invocation, so a slow
/// handler never delays the schedule.
#[derive(Debug)]
pub struct CronTrigger {
    armed: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl CronTrigger {
    /// Create a trigger for the given cron pattern, armed immediately.
    ///
    /// The pattern is parsed eagerly; invalid syntax fails here rather than
    /// at first fire. Standard 5-field patterns are accepted alongside the
    /// seconds-first 6/7-field form.
    pub fn new(pattern: &str, on_fire: FireHandler) -> Result<Self, SchedulerError> {
        let schedule = parse_schedule(pattern)?;

        let armed = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let loop_armed = armed.clone();
        let loop_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let next = match schedule.upcoming(Local).next() {
                    Some(next) => next,
                    None => break,
                };
                let wait = (next - Local::now()).to_std().unwrap_or_default();
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {
                        if loop_armed.load(Ordering::SeqCst) {
                            tokio::spawn(on_fire());
                        }
                    }
                }
            }
        });

        Ok(Self { armed, cancel })
    }

    /// Arm the trigger. No-op if already armed.
    pub fn start(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Disarm the trigger: the schedule keeps ticking but fires are suppressed.
    pub fn stop(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Dispose the trigger permanently. Safe to call more than once, and
    /// safe on an already-stopped trigger.
    pub fn destroy(&self) {
        self.cancel.cancel();
    }

    /// Whether fires are currently delivered.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }
}

/// Parse a pattern without arming anything — the same fail-fast check
/// [`CronTrigger::new`] performs, usable before persisting caller-supplied
/// schedules.
pub fn validate_pattern(pattern: &str) -> Result<(), SchedulerError> {
    parse_schedule(pattern).map(|_| ())
}

fn parse_schedule(pattern: &str) -> Result<Schedule, SchedulerError> {
    let normalized = normalize_pattern(pattern);
    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidSchedulePattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Accept standard 5-field cron by prepending the seconds field the
/// `cron` crate expects.
fn normalize_pattern(pattern: &str) -> String {
    let trimmed = pattern.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}
