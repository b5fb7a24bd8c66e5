//! Schedule and descriptor resolution.

use chrono::{DateTime, Duration, Local, Timelike};
use uuid::Uuid;

use recap_types::TaskDescriptor;

use crate::SchedulerError;
use crate::task::TaskProp;

/// Resolve a possibly-relative schedule expression into an absolute cron
/// pattern.
///
/// `check:<N>` means "N minutes from `now`", approximated as a daily pattern
/// at that hour:minute — it fires at the same clock time every day, not N
/// minutes from now on subsequent days. Anything else passes through
/// untouched.
pub fn resolve_pattern(
    pattern: &str,
    now: DateTime<Local>,
) -> Result<String, SchedulerError> {
    let Some(spec) = pattern.strip_prefix("check:") else {
        return Ok(pattern.to_string());
    };

    let minutes: i64 = spec.trim().parse().map_err(|_| {
        SchedulerError::InvalidSchedulePattern {
            pattern: pattern.to_string(),
            reason: "relative schedule wants a whole number of minutes".to_string(),
        }
    })?;

    let at = now + Duration::minutes(minutes);
    Ok(format!("{} {} * * *", at.minute(), at.hour()))
}

/// Resolve a descriptor into a [`TaskProp`]: the id is defaulted to a fresh
/// UUID when absent and both cron patterns are made absolute.
pub fn resolve_prop(
    descriptor: &TaskDescriptor,
    now: DateTime<Local>,
) -> Result<TaskProp, SchedulerError> {
    let cron_start = resolve_pattern(&descriptor.cron_start, now)?;
    let cron_stop = match &descriptor.cron_stop {
        Some(pattern) => Some(resolve_pattern(pattern, now)?),
        None => None,
    };

    Ok(TaskProp {
        id: descriptor
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: descriptor.name.clone(),
        cron_start,
        cron_stop,
        enabled: descriptor.enabled,
        options: descriptor.options.clone(),
    })
}
