// In-memory stand-ins for the hosted model and the vector store

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::Duration;

use crate::answer::LanguageModel;
use crate::database::{
    IndexEntry, IndexSpec, IndexStatus, SearchHit, Similarity, VectorStore, rank_hits,
};
use crate::embeddings::Embedder;
use crate::{QaError, Result};

/// Bag-of-words embedder: texts sharing words get similar vectors
pub struct HashEmbedder {
    pub dimension: usize,
}

impl HashEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| word.len() > 2)
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }
}

/// Brute-force store keeping entries in insertion order
#[derive(Default)]
pub struct MemoryStore {
    spec: Mutex<Option<IndexSpec>>,
    entries: Mutex<Vec<IndexEntry>>,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

impl MemoryStore {
    pub fn with_spec(spec: IndexSpec) -> Self {
        Self {
            spec: Mutex::new(Some(spec)),
            entries: Mutex::new(Vec::new()),
        }
    }

    fn current_spec(&self) -> Result<IndexSpec> {
        self.spec
            .lock()
            .expect("lock should not be poisoned")
            .ok_or_else(|| QaError::Store("index does not exist".to_string()))
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn create_index(&self, spec: &IndexSpec) -> Result<IndexStatus> {
        let mut current = self.spec.lock().expect("lock should not be poisoned");
        match *current {
            Some(existing) if existing == *spec => Ok(IndexStatus::AlreadyExists),
            Some(_) => Err(QaError::IndexConflict("parameters differ".to_string())),
            None => {
                *current = Some(*spec);
                Ok(IndexStatus::Created)
            }
        }
    }

    async fn describe(&self) -> Result<Option<IndexSpec>> {
        Ok(*self.spec.lock().expect("lock should not be poisoned"))
    }

    async fn add_entries(&self, entries: Vec<IndexEntry>) -> Result<usize> {
        let spec = self.current_spec()?;
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != spec.dimension) {
            return Err(QaError::DimensionMismatch {
                expected: spec.dimension,
                actual: bad.vector.len(),
            });
        }
        let count = entries.len();
        self.entries
            .lock()
            .expect("lock should not be poisoned")
            .extend(entries);
        Ok(count)
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let spec = self.current_spec()?;
        assert_eq!(spec.similarity, Similarity::Cosine);

        let mut hits: Vec<SearchHit> = self
            .entries
            .lock()
            .expect("lock should not be poisoned")
            .iter()
            .enumerate()
            .map(|(seq, entry)| SearchHit {
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score: cosine_similarity(query_vector, &entry.vector),
                seq: seq as u64,
            })
            .collect();
        rank_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.lock().expect("lock should not be poisoned").len())
    }
}

/// Store whose searches never complete in a reasonable time
pub struct HangingStore;

#[async_trait]
impl VectorStore for HangingStore {
    async fn create_index(&self, _spec: &IndexSpec) -> Result<IndexStatus> {
        Ok(IndexStatus::AlreadyExists)
    }

    async fn describe(&self) -> Result<Option<IndexSpec>> {
        Ok(None)
    }

    async fn add_entries(&self, entries: Vec<IndexEntry>) -> Result<usize> {
        Ok(entries.len())
    }

    async fn search(&self, _query_vector: &[f32], _k: usize) -> Result<Vec<SearchHit>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }

    async fn count(&self) -> Result<usize> {
        Ok(0)
    }
}

/// Store that is unreachable
pub struct FailingStore;

#[async_trait]
impl VectorStore for FailingStore {
    async fn create_index(&self, _spec: &IndexSpec) -> Result<IndexStatus> {
        Err(QaError::Store("connection refused".to_string()))
    }

    async fn describe(&self) -> Result<Option<IndexSpec>> {
        Err(QaError::Store("connection refused".to_string()))
    }

    async fn add_entries(&self, _entries: Vec<IndexEntry>) -> Result<usize> {
        Err(QaError::Store("connection refused".to_string()))
    }

    async fn search(&self, _query_vector: &[f32], _k: usize) -> Result<Vec<SearchHit>> {
        Err(QaError::Store("connection refused".to_string()))
    }

    async fn count(&self) -> Result<usize> {
        Err(QaError::Store("connection refused".to_string()))
    }
}

/// Model that answers with the first context line mentioning the question's last word
pub struct ExtractiveModel;

#[async_trait]
impl LanguageModel for ExtractiveModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let (context, question) = prompt
            .rsplit_once("Question: ")
            .ok_or_else(|| QaError::Upstream("prompt has no question".to_string()))?;
        let keyword = question
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().last())
            .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .unwrap_or_default();

        Ok(context
            .lines()
            .find(|line| !keyword.is_empty() && line.to_lowercase().contains(&keyword))
            .map_or_else(|| "I don't know.".to_string(), str::to_string))
    }
}
