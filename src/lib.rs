use std::future::Future;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QaError>;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Index conflict: {0}")]
    IndexConflict(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Upstream API error: {0}")]
    Upstream(String),

    #[error("Upstream API unavailable after retries: {0}")]
    Transient(String),

    #[error("Timed out after {elapsed:?}: {operation}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Prompt of ~{tokens} tokens exceeds the context limit of {limit}")]
    ContextOverflow { tokens: usize, limit: usize },

    #[error("Document error: {0}")]
    Document(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl QaError {
    /// Errors raised by a service this process depends on, as opposed to bad input.
    #[inline]
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Upstream(_) | Self::Transient(_) | Self::Timeout { .. }
        )
    }
}

/// Run `future`, failing with [`QaError::Timeout`] if it does not finish within `limit`.
#[inline]
pub async fn bounded<T, F>(operation: &str, limit: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("{} did not complete within {:?}", operation, limit);
            Err(QaError::Timeout {
                operation: operation.to_string(),
                elapsed: limit,
            })
        }
    }
}

pub mod answer;
pub mod commands;
pub mod config;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod indexer;
pub mod qa;
pub mod retrieval;
pub mod server;

#[cfg(test)]
mod test_support;
