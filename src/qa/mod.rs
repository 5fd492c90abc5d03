// Question answering: retrieval followed by answer composition


use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::answer::{AnswerComposer, LanguageModel};
use crate::config::Config;
use crate::database::{EntryMetadata, VectorStore};
use crate::embeddings::Embedder;
use crate::retrieval::Retriever;
use crate::{QaError, Result};

/// Generated answer plus the chunks it was grounded on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    #[serde(flatten)]
    pub metadata: EntryMetadata,
    pub score: f32,
}

/// Shared, read-only pipeline handed to every request
pub struct QaService {
    retriever: Retriever,
    composer: AnswerComposer,
}

impl QaService {
    #[inline]
    pub fn new(retriever: Retriever, composer: AnswerComposer) -> Self {
        Self {
            retriever,
            composer,
        }
    }

    /// Wire the pipeline from configuration and already-constructed clients
    #[inline]
    pub fn from_parts(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let call_timeout = config.call_timeout();
        Self::new(
            Retriever::new(embedder, store, config.retrieval.top_k, call_timeout),
            AnswerComposer::new(model, &config.answer, call_timeout),
        )
    }

    /// Answer `question` from the indexed documents
    #[instrument(skip(self), fields(question_len = question.len()))]
    #[inline]
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::Validation(
                "question must not be empty".to_string(),
            ));
        }

        let hits = self.retriever.retrieve(question).await?;
        info!("Retrieved {} chunks", hits.len());

        let text = self.composer.compose(question, &hits).await?;

        Ok(Answer {
            text,
            sources: hits
                .into_iter()
                .map(|hit| Source {
                    metadata: hit.metadata,
                    score: hit.score,
                })
                .collect(),
        })
    }
}
