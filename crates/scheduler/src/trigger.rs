//! Cron trigger for payment runs

use crate::error::{SchedulerError, SchedulerResult};
use crate::scheduler::PaymentScheduler;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const DEFAULT_CRON_SCHEDULE: &str = "0 * * * *";

/// Parse a cron expression. Classic five-field expressions get a leading
/// seconds field of `0`, and their day-of-week field (0-7, Sunday = 0 or 7)
/// is renumbered to the 1-7, Sunday = 1 convention of six-field schedules.
pub fn parse_schedule(expression: &str) -> SchedulerResult<Schedule> {
    let invalid = |reason: String| SchedulerError::Schedule {
        expression: expression.to_string(),
        reason,
    };

    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = if let [minute, hour, day, month, weekday] = fields[..] {
        let weekday = classic_weekdays(weekday).map_err(invalid)?;
        format!("0 {} {} {} {} {}", minute, hour, day, month, weekday)
    } else {
        fields.join(" ")
    };

    Schedule::from_str(&normalized).map_err(|e| invalid(e.to_string()))
}

const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Expands a classic day-of-week field into an explicit 1-7 list.
fn classic_weekdays(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days = BTreeSet::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: usize = step
                    .parse()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| format!("invalid day-of-week step `{}`", step))?;
                (range, step)
            }
            None => (item, 1),
        };

        let (start, end) = match range.split_once('-') {
            _ if range == "*" => (0, 6),
            Some((start, end)) => (classic_weekday(start)?, classic_weekday(end)?),
            None if step > 1 => (classic_weekday(range)?, 6),
            None => {
                let day = classic_weekday(range)?;
                (day, day)
            }
        };
        if start > end {
            return Err(format!("day-of-week range `{}` runs backwards", range));
        }

        days.extend((start..=end).step_by(step).map(|day| day % 7 + 1));
    }

    Ok(days.iter().map(u32::to_string).collect::<Vec<_>>().join(","))
}

/// `0`-`7` or a three-letter name, as a classic day number (Sunday = 0).
fn classic_weekday(token: &str) -> Result<u32, String> {
    if let Ok(day) = token.parse::<u32>() {
        return if day <= 7 {
            Ok(day)
        } else {
            Err(format!("day of week `{}` out of range", token))
        };
    }
    WEEKDAY_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
        .map(|day| day as u32)
        .ok_or_else(|| format!("unknown day of week `{}`", token))
}

/// Fires payment runs on a UTC cron schedule.
pub struct CronTrigger {
    expression: String,
    schedule: Schedule,
}

impl CronTrigger {
    pub fn new(expression: &str) -> SchedulerResult<Self> {
        Ok(Self {
            expression: expression.to_string(),
            schedule: parse_schedule(expression)?,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Run once immediately, then on every tick, until `shutdown` flips to
    /// `true`. Ticks that land while a run is in flight are skipped. An
    /// in-flight run is allowed to finish before this returns.
    pub async fn run(&self, scheduler: Arc<PaymentScheduler>, mut shutdown: watch::Receiver<bool>) {
        info!(schedule = %self.expression, "Starting payment scheduler");
        let mut in_flight = Some(spawn_run(&scheduler));

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = Utc::now();
            let Some(next) = self.next_after(now) else {
                warn!(schedule = %self.expression, "Schedule has no upcoming ticks");
                let _ = shutdown.changed().await;
                break;
            };
            let wait = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if scheduler.is_running() {
                        warn!("Previous payment run still in progress; skipping this tick");
                        continue;
                    }
                    in_flight = Some(spawn_run(&scheduler));
                }
                _ = shutdown.changed() => break,
            }
        }

        if let Some(handle) = in_flight {
            if !handle.is_finished() {
                info!("Waiting for the in-flight payment run to finish");
            }
            if let Err(e) = handle.await {
                error!(error = %e, "Payment run task panicked");
            }
        }
        info!("Payment scheduler stopped");
    }
}

fn spawn_run(scheduler: &Arc<PaymentScheduler>) -> JoinHandle<()> {
    let scheduler = scheduler.clone();
    tokio::spawn(async move {
        match scheduler.run_once().await {
            Ok(_) => {}
            Err(SchedulerError::RunInProgress) => {
                warn!("Previous payment run still in progress; skipping this tick");
            }
            Err(e) => error!(error = %e, "Error in payment checking process"),
        }
    })
}
