//! Error types for chain access and program decoding

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Rate limited by RPC endpoint: {0}")]
    RateLimited(String),

    #[error("IDL error: {0}")]
    Idl(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid account data for {address}: {reason}")]
    InvalidAccount { address: String, reason: String },

    #[error("Cannot resolve account `{0}` for payment instruction")]
    UnresolvedAccount(String),

    #[error("Keypair error: {0}")]
    Keypair(String),

    #[error("Invalid signature `{0}`")]
    InvalidSignature(String),
}

impl ChainError {
    /// Builds an RPC error, classifying upstream throttling as [`ChainError::RateLimited`].
    pub fn rpc(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_rate_limit_message(&message) {
            ChainError::RateLimited(message)
        } else {
            ChainError::Rpc(message)
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ChainError::RateLimited(_))
    }
}

/// Matches the status code and message shapes RPC providers use when throttling.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
}

impl From<solana_client::client_error::ClientError> for ChainError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        ChainError::rpc(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Decode(err.to_string())
    }
}

pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_messages() {
        assert!(ChainError::rpc("HTTP status client error (429 Too Many Requests)").is_rate_limited());
        assert!(ChainError::rpc("Server responded with Rate limit exceeded").is_rate_limited());
        assert!(!ChainError::rpc("Transaction version (1) is not supported").is_rate_limited());
    }
}
