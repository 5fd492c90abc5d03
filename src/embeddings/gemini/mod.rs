
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::answer::LanguageModel;
use crate::config::GeminiConfig;
use crate::embeddings::Embedder;
use crate::{QaError, Result};

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Client for the Gemini embedding and generation endpoints
#[derive(Clone)]
pub struct GeminiClient {
    base_url: Url,
    api_key: String,
    embedding_model: String,
    chat_model: String,
    dimension: usize,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff: Duration,
}

/// How an embedding will be used, which Gemini optimizes for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: TaskType,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url.as_str())
            .field("embedding_model", &self.embedding_model)
            .field("chat_model", &self.chat_model)
            .field("dimension", &self.dimension)
            .field("batch_size", &self.batch_size)
            .field("retry_attempts", &self.retry_attempts)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let base_url = config
            .api_url()
            .map_err(|e| QaError::Config(e.to_string()))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| QaError::Config("GEMINI_API_KEY is not set".to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.request_timeout_secs)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            dimension: config.embedding_dimension as usize,
            batch_size: config.batch_size.max(1),
            agent,
            retry_attempts: config.retry_attempts.max(1),
            backoff: DEFAULT_BACKOFF,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Delay before the first retry; later retries double it
    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Embed a single text
    #[inline]
    pub fn embed_text(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedContentRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
            task_type,
        };

        let url = self.model_url(&self.embedding_model, "embedContent")?;
        let request_json = serde_json::to_string(&request)
            .map_err(|e| QaError::Other(anyhow::anyhow!("Failed to serialize request: {}", e)))?;

        let response_text = self.post_with_retry(&url, &request_json)?;
        let response: EmbedContentResponse = serde_json::from_str(&response_text).map_err(|e| {
            QaError::Upstream(format!("Failed to parse embedding response: {}", e))
        })?;

        self.check_dimension(&response.embedding.values)?;
        Ok(response.embedding.values)
    }

    /// Embed many texts, sending at most `batch_size` per request
    #[inline]
    pub fn embed_texts(&self, texts: &[String], task_type: TaskType) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            if let [text] = batch {
                vectors.push(self.embed_text(text, task_type)?);
            } else {
                vectors.extend(self.embed_batch(batch, task_type)?);
            }
        }

        debug!("Generated {} embeddings total", vectors.len());
        Ok(vectors)
    }

    fn embed_batch(&self, texts: &[String], task_type: TaskType) -> Result<Vec<Vec<f32>>> {
        let model = format!("models/{}", self.embedding_model);
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: model.clone(),
                    content: Content {
                        role: None,
                        parts: vec![Part { text }],
                    },
                    task_type,
                })
                .collect(),
        };

        let url = self.model_url(&self.embedding_model, "batchEmbedContents")?;
        let request_json = serde_json::to_string(&request).map_err(|e| {
            QaError::Other(anyhow::anyhow!("Failed to serialize batch request: {}", e))
        })?;

        let response_text = self.post_with_retry(&url, &request_json)?;
        let response: BatchEmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            QaError::Upstream(format!("Failed to parse batch embedding response: {}", e))
        })?;

        if response.embeddings.len() != texts.len() {
            return Err(QaError::Upstream(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        response
            .embeddings
            .into_iter()
            .map(|embedding| {
                self.check_dimension(&embedding.values)?;
                Ok(embedding.values)
            })
            .collect()
    }

    /// Generate a completion for a single-turn prompt
    #[inline]
    pub fn generate_text(&self, prompt: &str) -> Result<String> {
        debug!("Generating completion for prompt (length: {})", prompt.len());

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
        };

        let url = self.model_url(&self.chat_model, "generateContent")?;
        let request_json = serde_json::to_string(&request)
            .map_err(|e| QaError::Other(anyhow::anyhow!("Failed to serialize request: {}", e)))?;

        let response_text = self.post_with_retry(&url, &request_json)?;
        let response: GenerateContentResponse =
            serde_json::from_str(&response_text).map_err(|e| {
                QaError::Upstream(format!("Failed to parse generation response: {}", e))
            })?;

        let Some(candidate) = response.candidates.into_iter().next() else {
            let reason = response
                .prompt_feedback
                .and_then(|feedback| feedback.block_reason)
                .unwrap_or_else(|| "unknown".to_string());
            return Err(QaError::Upstream(format!(
                "Model returned no candidates (block reason: {})",
                reason
            )));
        };

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(QaError::Upstream(format!(
                "Model returned an empty answer (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text)
    }

    fn model_url(&self, model: &str, method: &str) -> Result<Url> {
        self.base_url
            .join(&format!("/v1beta/models/{}:{}", model, method))
            .map_err(|e| QaError::Config(format!("Failed to build {} URL: {}", method, e)))
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() == self.dimension {
            Ok(())
        } else {
            Err(QaError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            })
        }
    }

    fn post_with_retry(&self, url: &Url, body: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!(
                "POST {} attempt {}/{}",
                url.path(),
                attempt,
                self.retry_attempts
            );

            let result = self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("x-goog-api-key", &self.api_key)
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string());

            match result {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    match &error {
                        ureq::Error::StatusCode(status) if *status == 429 || *status >= 500 => {
                            warn!(
                                "Upstream returned {}, attempt {}/{}",
                                status, attempt, self.retry_attempts
                            );
                        }
                        ureq::Error::StatusCode(status) => {
                            warn!("Client error (status {}), not retrying", status);
                            return Err(QaError::Upstream(format!(
                                "{} returned HTTP {}",
                                url.path(),
                                status
                            )));
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            return Err(QaError::Upstream(format!(
                                "Request to {} failed: {}",
                                url.path(),
                                error
                            )));
                        }
                    }

                    last_error = Some(error.to_string());

                    if attempt < self.retry_attempts {
                        let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", url.path());

        Err(QaError::Transient(format!(
            "{} after {} attempts: {}",
            url.path(),
            self.retry_attempts,
            last_error.unwrap_or_else(|| "no response".to_string())
        )))
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| QaError::Other(anyhow::anyhow!("Blocking task failed: {}", e)))?
}

#[async_trait]
impl Embedder for GeminiClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let client = self.clone();
        let texts = texts.to_vec();
        run_blocking(move || client.embed_texts(&texts, TaskType::RetrievalDocument)).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let client = self.clone();
        let text = text.to_string();
        run_blocking(move || client.embed_text(&text, TaskType::RetrievalQuery)).await
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let client = self.clone();
        let prompt = prompt.to_string();
        let answer = run_blocking(move || client.generate_text(&prompt)).await?;
        info!("Generated answer of {} characters", answer.len());
        Ok(answer)
    }
}
