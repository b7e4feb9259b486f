//! Centralized error types for the indexer

use thiserror::Error;
use tributary_chain::ChainError;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type IndexerResult<T> = Result<T, IndexerError>;

impl From<redis::RedisError> for IndexerError {
    fn from(err: redis::RedisError) -> Self {
        IndexerError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for IndexerError {
    fn from(err: reqwest::Error) -> Self {
        IndexerError::Bus(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for IndexerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        IndexerError::Stream(err.to_string())
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(err: serde_json::Error) -> Self {
        IndexerError::Serialization(err.to_string())
    }
}
