// Indexer module
// Turns documents into chunks, embeds them and appends them to the vector store


use indicatif::ProgressBar;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::database::{EntryMetadata, IndexEntry, VectorStore};
use crate::document::{Document, load_document};
use crate::embeddings::{Chunk, ChunkingConfig, Embedder, chunk_documents};
use crate::{QaError, Result, bounded};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Summary of a finished ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub pages: usize,
    pub chunks: usize,
    pub entries_written: usize,
}

pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkingConfig,
    batch_size: usize,
    call_timeout: Duration,
    progress: ProgressBar,
}

impl Indexer {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        chunking: ChunkingConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            store,
            chunking,
            batch_size: DEFAULT_BATCH_SIZE,
            call_timeout,
            progress: ProgressBar::hidden(),
        }
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Report progress in chunks written
    #[inline]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Load, chunk and store a file
    #[inline]
    pub async fn ingest_file(&self, path: &Path, source: Option<&str>) -> Result<IngestReport> {
        let documents = load_document(path, source)?;
        self.ingest_documents(&documents).await
    }

    #[inline]
    pub async fn ingest_documents(&self, documents: &[Document]) -> Result<IngestReport> {
        let chunks = chunk_documents(documents, &self.chunking);
        info!(
            "Split {} pages into {} chunks",
            documents.len(),
            chunks.len()
        );

        let entries_written = self.add_documents(&chunks).await?;
        Ok(IngestReport {
            pages: documents.len(),
            chunks: chunks.len(),
            entries_written,
        })
    }

    /// Embed chunks and append one entry per non-blank chunk.
    ///
    /// Batches written before a failure stay in the store.
    #[inline]
    pub async fn add_documents(&self, chunks: &[Chunk]) -> Result<usize> {
        let chunks: Vec<&Chunk> = chunks.iter().filter(|chunk| !chunk.is_blank()).collect();
        if chunks.is_empty() {
            debug!("No chunks to index");
            return Ok(0);
        }

        let spec = bounded("index lookup", self.call_timeout, self.store.describe())
            .await?
            .ok_or_else(|| {
                QaError::Store("Index does not exist; run create-index first".to_string())
            })?;
        if spec.dimension != self.embedder.dimension() {
            return Err(QaError::DimensionMismatch {
                expected: spec.dimension,
                actual: self.embedder.dimension(),
            });
        }

        self.progress.set_length(chunks.len() as u64);
        self.progress.set_position(0);

        let mut written = 0;
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = bounded(
                "document embedding",
                self.call_timeout,
                self.embedder.embed_documents(&texts),
            )
            .await?;

            if vectors.len() != batch.len() {
                return Err(QaError::Upstream(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            let entries: Vec<IndexEntry> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexEntry {
                    text: chunk.text.clone(),
                    vector,
                    metadata: EntryMetadata {
                        document: chunk.metadata.clone(),
                        chunk_index: chunk.chunk_index as u32,
                    },
                })
                .collect();

            written += bounded(
                "vector store write",
                self.call_timeout,
                self.store.add_entries(entries),
            )
            .await?;

            self.progress.set_position(written as u64);
            debug!("Indexed {}/{} chunks", written, chunks.len());
        }

        self.progress.finish_and_clear();
        info!("Indexed {} chunks", written);
        Ok(written)
    }
}
