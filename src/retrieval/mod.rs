
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::database::{SearchHit, VectorStore};
use crate::embeddings::Embedder;
use crate::{Result, bounded};

/// Finds the stored chunks most similar to a query
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
    call_timeout: Duration,
}

impl Retriever {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        top_k: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            store,
            top_k,
            call_timeout,
        }
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Top `top_k` chunks for `query`, most similar first
    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.retrieve_k(query, self.top_k).await
    }

    #[inline]
    pub async fn retrieve_k(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let vector = bounded(
            "query embedding",
            self.call_timeout,
            self.embedder.embed_query(query),
        )
        .await?;

        let hits = bounded(
            "vector search",
            self.call_timeout,
            self.store.search(&vector, k),
        )
        .await?;

        debug!("Retrieved {} of up to {} chunks", hits.len(), k);
        Ok(hits)
    }
}
