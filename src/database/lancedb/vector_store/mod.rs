
use ::lancedb::query::{ExecutableQuery, QueryBase};
use ::lancedb::{Connection, DistanceType, Table};
use arrow::array::RecordBatchIterator;
use async_trait::async_trait;
use futures::TryStreamExt;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{VECTOR_COLUMN, batch_to_hits, entries_to_batch, entry_schema, spec_from_schema};
use crate::config::Config;
use crate::database::{
    IndexEntry, IndexSpec, IndexStatus, SearchHit, Similarity, VectorStore, rank_hits,
};
use crate::{QaError, Result};

/// Vector store backed by a LanceDB table per named index
pub struct LanceVectorStore {
    connection: Connection,
    index_name: String,
    /// Serializes writes so insertion sequence numbers stay unique
    write_lock: Mutex<()>,
}

impl From<Similarity> for DistanceType {
    fn from(similarity: Similarity) -> Self {
        match similarity {
            Similarity::Cosine => Self::Cosine,
            Similarity::Euclidean => Self::L2,
        }
    }
}

impl LanceVectorStore {
    /// Connect to the store configured in `config`
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::connect(&config.store_uri(), &config.store.index_name).await
    }

    /// Connect to `uri`, a local directory or any URI LanceDB understands
    #[inline]
    pub async fn connect(uri: &str, index_name: &str) -> Result<Self> {
        debug!("Connecting to LanceDB at {}", uri);

        if !uri.contains("://") {
            std::fs::create_dir_all(Path::new(uri)).map_err(|e| {
                QaError::Store(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let connection = ::lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| QaError::Store(format!("Failed to connect to LanceDB: {}", e)))?;

        info!("Vector store connected (index: {})", index_name);
        Ok(Self {
            connection,
            index_name: index_name.to_string(),
            write_lock: Mutex::new(()),
        })
    }

    #[inline]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    async fn index_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| QaError::Store(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.contains(&self.index_name))
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.index_name)
            .execute()
            .await
            .map_err(|e| QaError::Store(format!("Failed to open table: {}", e)))
    }

    async fn existing_spec(&self) -> Result<IndexSpec> {
        self.describe().await?.ok_or_else(|| {
            QaError::Store(format!(
                "Index {:?} does not exist; run create-index first",
                self.index_name
            ))
        })
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn create_index(&self, spec: &IndexSpec) -> Result<IndexStatus> {
        if let Some(existing) = self.describe().await? {
            if existing == *spec {
                info!(
                    "Index {:?} already exists with {} dimensions ({})",
                    self.index_name, spec.dimension, spec.similarity
                );
                return Ok(IndexStatus::AlreadyExists);
            }

            warn!(
                "Index {:?} exists with {:?}, requested {:?}",
                self.index_name, existing, spec
            );
            return Err(QaError::IndexConflict(format!(
                "index {:?} exists with {} dimensions ({}), requested {} dimensions ({})",
                self.index_name,
                existing.dimension,
                existing.similarity,
                spec.dimension,
                spec.similarity
            )));
        }

        self.connection
            .create_empty_table(&self.index_name, entry_schema(*spec))
            .execute()
            .await
            .map_err(|e| QaError::Store(format!("Failed to create table: {}", e)))?;

        info!(
            "Created index {:?} with {} dimensions ({})",
            self.index_name, spec.dimension, spec.similarity
        );
        Ok(IndexStatus::Created)
    }

    async fn describe(&self) -> Result<Option<IndexSpec>> {
        if !self.index_exists().await? {
            return Ok(None);
        }

        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .map_err(|e| QaError::Store(format!("Failed to get table schema: {}", e)))?;

        spec_from_schema(&schema).map(Some)
    }

    async fn add_entries(&self, entries: Vec<IndexEntry>) -> Result<usize> {
        if entries.is_empty() {
            debug!("No entries to store");
            return Ok(0);
        }

        let spec = self.existing_spec().await?;
        let table = self.open_table().await?;

        let _guard = self.write_lock.lock().await;
        let first_seq = table
            .count_rows(None)
            .await
            .map_err(|e| QaError::Store(format!("Failed to count rows: {}", e)))?
            as u64;

        let batch = entries_to_batch(&entries, spec, first_seq)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);

        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| QaError::Store(format!("Failed to insert entries: {}", e)))?;

        debug!("Stored {} entries starting at seq {}", entries.len(), first_seq);
        Ok(entries.len())
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let spec = self.existing_spec().await?;
        if query_vector.len() != spec.dimension {
            return Err(QaError::DimensionMismatch {
                expected: spec.dimension,
                actual: query_vector.len(),
            });
        }

        debug!("Searching {:?} for top {}", self.index_name, k);

        let table = self.open_table().await?;
        let total = table
            .count_rows(None)
            .await
            .map_err(|e| QaError::Store(format!("Failed to count rows: {}", e)))?;

        // Widen the limit until every row tied with the k-th hit is returned,
        // so ties are settled by seq rather than by scan order.
        let mut limit = k.min(total);
        let mut hits = nearest(&table, query_vector, spec.similarity, limit).await?;
        rank_hits(&mut hits);
        while hits.len() >= limit && limit < total && hits.len() >= k {
            let boundary = hits[k - 1].score;
            let worst = hits.last().map_or(boundary, |hit| hit.score);
            if worst < boundary {
                break;
            }

            limit = limit.saturating_mul(2).min(total);
            debug!("Ties at rank {}, widening search to {}", k, limit);
            hits = nearest(&table, query_vector, spec.similarity, limit).await?;
            rank_hits(&mut hits);
        }
        hits.truncate(k);

        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        if !self.index_exists().await? {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| QaError::Store(format!("Failed to count rows: {}", e)))
    }
}

/// Unordered nearest `limit` rows of `table` to `query_vector`
async fn nearest(
    table: &Table,
    query_vector: &[f32],
    similarity: Similarity,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut results = table
        .vector_search(query_vector)
        .map_err(|e| QaError::Store(format!("Failed to create vector search: {}", e)))?
        .column(VECTOR_COLUMN)
        .distance_type(similarity.into())
        .limit(limit)
        .execute()
        .await
        .map_err(|e| QaError::Store(format!("Failed to execute search: {}", e)))?;

    let mut hits = Vec::new();
    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| QaError::Store(format!("Failed to read result stream: {}", e)))?
    {
        hits.extend(batch_to_hits(&batch, similarity)?);
    }

    Ok(hits)
}
