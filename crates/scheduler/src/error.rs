use thiserror::Error;
use tributary_chain::ChainError;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Invalid schedule `{expression}`: {reason}")]
    Schedule { expression: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("A payment run is already in progress")]
    RunInProgress,
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
