// Embeddings module
// Chunking plus the hosted embedding model behind the `Embedder` trait

pub mod chunking;
pub mod gemini;

use async_trait::async_trait;

use crate::Result;

pub use chunking::{
    Chunk, ChunkingConfig, TextSpan, chunk_documents, estimate_token_count, reassemble,
    split_text,
};
pub use gemini::{GeminiClient, TaskType};

/// Maps text to fixed-dimension vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;

    /// Embed chunk texts for storage, one vector per input in input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a question for retrieval
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}
