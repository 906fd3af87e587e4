use std::sync::Arc;
use std::time::Duration;

use weft_llm::AnyProvider;
use weft_llm::provider::EmbedBatchFuture;

use crate::chunker::{TokenChunk, chunk_text};
use crate::error::EmbeddingError;
use crate::tokenizer::{Tokenizer, WordPieceTokenizer};

pub type EmbedBatchFn = Arc<dyn Fn(Vec<String>) -> EmbedBatchFuture + Send + Sync>;

const DEFAULT_BATCH_SIZE: usize = 64;

/// Exponential backoff for transient embedding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Batched embedding calls with retry, plus the token chunking used before embedding.
#[derive(Clone)]
pub struct EmbeddingService {
    embed_fn: EmbedBatchFn,
    tokenizer: Arc<dyn Tokenizer>,
    retry: RetryPolicy,
    batch_size: usize,
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("retry", &self.retry)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl EmbeddingService {
    #[must_use]
    pub fn new(embed_fn: EmbedBatchFn) -> Self {
        Self {
            embed_fn,
            tokenizer: Arc::new(WordPieceTokenizer),
            retry: RetryPolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn from_provider(provider: &AnyProvider) -> Self {
        Self::new(Arc::new(provider.embed_batch_fn()))
    }

    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// # Errors
    ///
    /// Returns [`EmbeddingError::InvalidWindow`] when `overlap >= chunk_size`.
    pub fn chunk_text(
        &self,
        text: &str,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Vec<TokenChunk>, EmbeddingError> {
        chunk_text(self.tokenizer.as_ref(), text, chunk_size, overlap)
    }

    /// Embed all `texts`, one vector per input in input order.
    ///
    /// Any batch that still fails after the retry budget rejects the whole call.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::ExternalService`] once retries are exhausted or the failure is
    /// permanent, and [`EmbeddingError::CountMismatch`] if the backend returns the wrong number
    /// of vectors.
    pub async fn get_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let out = self.embed_with_retry(batch).await?;
            if out.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: out.len(),
                });
            }
            vectors.extend(out);
        }
        Ok(vectors)
    }

    /// # Errors
    ///
    /// See [`EmbeddingService::get_embeddings`].
    pub async fn get_embedding(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut out = self.get_embeddings(&[text.to_owned()]).await?;
        out.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    async fn embed_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match (self.embed_fn)(batch.to_vec()).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "embedding batch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(EmbeddingError::ExternalService {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

/// Cosine similarity `dot(a, b) / (|a| * |b|)`.
///
/// # Errors
///
/// Returns [`EmbeddingError::DimensionMismatch`] for unequal lengths and
/// [`EmbeddingError::ZeroVector`] when either norm is zero.
pub fn calculate_similarity(a: &[f32], b: &[f32]) -> Result<f32, EmbeddingError> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(EmbeddingError::ZeroVector);
    }
    Ok(dot / (norm_a * norm_b))
}
