//! Tributary payment scheduler
//!
//! Lists the payment policies managed by the gateway, picks the ones that
//! are due and executes them one at a time on a cron schedule.

pub mod config;
pub mod due;
pub mod error;
pub mod scheduler;
pub mod trigger;

pub use config::SchedulerConfig;
pub use due::{due_status, is_payment_due, DueStatus};
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{PaymentScheduler, RunSummary};
pub use trigger::{parse_schedule, CronTrigger};
