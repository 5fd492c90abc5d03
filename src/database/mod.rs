// Database module
// Vector storage behind the `VectorStore` trait, backed by LanceDB

pub mod lancedb;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Result;
use crate::document::DocumentMetadata;

pub use self::lancedb::LanceVectorStore;

/// Similarity function a vector index ranks by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Similarity {
    #[default]
    Cosine,
    Euclidean,
}

impl Similarity {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
        }
    }

    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cosine" => Some(Self::Cosine),
            "euclidean" => Some(Self::Euclidean),
            _ => None,
        }
    }

    /// Convert a store distance into a score where higher is more similar
    #[inline]
    pub fn score_from_distance(self, distance: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::Euclidean => 1.0 / (1.0 + distance),
        }
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters the store's named index is provisioned with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub dimension: usize,
    pub similarity: Similarity,
}

/// Outcome of [`VectorStore::create_index`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Created,
    AlreadyExists,
}

/// A chunk with its vector, ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// Metadata stored alongside each vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(flatten)]
    pub document: DocumentMetadata,
    /// Index of the chunk within its page
    pub chunk_index: u32,
}

/// A stored entry matched by a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub text: String,
    pub metadata: EntryMetadata,
    /// Higher is more similar; 1.0 is an exact cosine match
    pub score: f32,
    /// Insertion sequence number, used to break score ties
    pub seq: u64,
}

/// Persistence and nearest-neighbour search over index entries
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Provision the index. Identical parameters are a no-op; conflicting ones fail.
    async fn create_index(&self, spec: &IndexSpec) -> Result<IndexStatus>;

    /// Parameters of the existing index, `None` when it has not been created
    async fn describe(&self) -> Result<Option<IndexSpec>>;

    /// Append entries; every vector must match the index dimension
    async fn add_entries(&self, entries: Vec<IndexEntry>) -> Result<usize>;

    /// Top `k` entries, most similar first, ties broken by insertion order
    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Number of stored entries
    async fn count(&self) -> Result<usize>;
}

/// Sort hits by descending score, then by insertion order
#[inline]
pub fn rank_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.seq.cmp(&b.seq)));
}
