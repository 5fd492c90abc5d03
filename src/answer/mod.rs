// Answer module
// Builds the "stuff" prompt from retrieved chunks and asks the language model


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AnswerConfig;
use crate::database::SearchHit;
use crate::embeddings::estimate_token_count;
use crate::{QaError, Result, bounded};

const PROMPT_INSTRUCTION: &str = "Use the following pieces of context to answer the question at the end. If you don't know the answer, just say that you don't know, don't try to make up an answer.";
const CONTEXT_SEPARATOR: &str = "\n\n";

/// A hosted or local text generation model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a single-turn prompt
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// What to do when the prompt would exceed the context limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Drop the lowest-ranked chunks until the prompt fits
    #[default]
    Truncate,
    /// Fail the request
    Reject,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Truncate => "truncate",
            Self::Reject => "reject",
        })
    }
}

/// Render the prompt for `question` over the given context texts, in order
#[inline]
pub fn build_prompt(question: &str, contexts: &[&str]) -> String {
    format!(
        "{}\n\n{}\n\nQuestion: {}\nHelpful Answer:",
        PROMPT_INSTRUCTION,
        contexts.join(CONTEXT_SEPARATOR),
        question
    )
}

pub struct AnswerComposer {
    model: Arc<dyn LanguageModel>,
    max_context_tokens: usize,
    overflow_policy: OverflowPolicy,
    call_timeout: Duration,
}

impl AnswerComposer {
    #[inline]
    pub fn new(model: Arc<dyn LanguageModel>, config: &AnswerConfig, call_timeout: Duration) -> Self {
        Self {
            model,
            max_context_tokens: config.max_context_tokens,
            overflow_policy: config.overflow_policy,
            call_timeout,
        }
    }

    /// Build the prompt, applying the context guard.
    ///
    /// Returns the prompt and how many of the leading `hits` it includes.
    #[inline]
    pub fn prepare_prompt(&self, question: &str, hits: &[SearchHit]) -> Result<(String, usize)> {
        let mut contexts: Vec<&str> = hits.iter().map(|hit| hit.text.as_str()).collect();

        loop {
            let prompt = build_prompt(question, &contexts);
            let tokens = estimate_token_count(&prompt);
            if tokens <= self.max_context_tokens {
                debug!(
                    "Prompt uses {} of {} context tokens with {} chunks",
                    tokens,
                    self.max_context_tokens,
                    contexts.len()
                );
                return Ok((prompt, contexts.len()));
            }

            if self.overflow_policy == OverflowPolicy::Reject || contexts.is_empty() {
                warn!(
                    "Prompt of ~{} tokens exceeds limit of {}",
                    tokens, self.max_context_tokens
                );
                return Err(QaError::ContextOverflow {
                    tokens,
                    limit: self.max_context_tokens,
                });
            }

            contexts.pop();
            debug!("Dropped lowest-ranked chunk, {} remain", contexts.len());
        }
    }

    /// Answer `question` grounded on `hits`, which must be most-similar-first
    #[inline]
    pub async fn compose(&self, question: &str, hits: &[SearchHit]) -> Result<String> {
        let (prompt, used) = self.prepare_prompt(question, hits)?;
        if used < hits.len() {
            info!(
                "Context truncated to {} of {} retrieved chunks",
                used,
                hits.len()
            );
        }

        bounded(
            "language model call",
            self.call_timeout,
            self.model.generate(&prompt),
        )
        .await
    }
}
