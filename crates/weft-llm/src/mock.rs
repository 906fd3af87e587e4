//! Scriptable in-process provider for tests.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::error::LlmError;
use crate::provider::{ChatStream, GenerateOptions, LlmProvider, Message};

const DEFAULT_DIMENSION: usize = 32;

#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<String>>>,
    pub default_response: String,
    /// Explicit fragments for `chat_stream`; otherwise the next response is split on spaces.
    pub stream_fragments: Option<Vec<String>>,
    /// Yield this many fragments, then an error.
    pub stream_fail_after: Option<usize>,
    pub fail_stream_open: bool,
    pub fail_chat: bool,
    pub streaming: bool,
    pub supports_embeddings: bool,
    /// Fixed vector returned for every text. `None` hashes words into `dimension` buckets.
    pub embedding: Option<Vec<f32>>,
    pub dimension: usize,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
    embed_failures: Arc<AtomicUsize>,
    chat_calls: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
    last_messages: Arc<Mutex<Vec<Message>>>,
    last_options: Arc<Mutex<GenerateOptions>>,
    stream_dropped: Arc<AtomicBool>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            default_response: "mock response".into(),
            stream_fragments: None,
            stream_fail_after: None,
            fail_stream_open: false,
            fail_chat: false,
            streaming: true,
            supports_embeddings: true,
            embedding: None,
            dimension: DEFAULT_DIMENSION,
            delay_ms: 0,
            embed_failures: Arc::new(AtomicUsize::new(0)),
            chat_calls: Arc::new(AtomicUsize::new(0)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            last_messages: Arc::new(Mutex::new(Vec::new())),
            last_options: Arc::new(Mutex::new(GenerateOptions::default())),
            stream_dropped: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            fail_stream_open: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_stream_fragments(mut self, fragments: Vec<String>) -> Self {
        self.stream_fragments = Some(fragments);
        self
    }

    #[must_use]
    pub fn with_stream_failure_after(mut self, fragments: usize) -> Self {
        self.stream_fail_after = Some(fragments);
        self
    }

    #[must_use]
    pub fn with_stream_open_failure(mut self) -> Self {
        self.fail_stream_open = true;
        self
    }

    #[must_use]
    pub fn without_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.dimension = embedding.len();
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    #[must_use]
    pub fn without_embeddings(mut self) -> Self {
        self.supports_embeddings = false;
        self
    }

    /// Fail the next `n` embedding calls with a transient error.
    #[must_use]
    pub fn with_embed_failures(self, n: usize) -> Self {
        self.embed_failures.store(n, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Messages passed to the most recent `chat` or `chat_stream` call.
    #[must_use]
    pub fn last_messages(&self) -> Vec<Message> {
        self.last_messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn last_options(&self) -> GenerateOptions {
        *self
            .last_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a stream handed out by `chat_stream` has been dropped.
    #[must_use]
    pub fn stream_dropped(&self) -> bool {
        self.stream_dropped.load(Ordering::SeqCst)
    }

    async fn record_call(&self, messages: &[Message], options: &GenerateOptions) {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = messages.to_vec();
        *self
            .last_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = *options;
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
    }

    fn next_response(&self) -> String {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone())
    }

    fn hashed_embedding(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension.max(1);
        let mut v = vec![0.0f32; dim];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            // FNV-1a
            let mut h: u64 = 0xcbf2_9ce4_8422_2325;
            for b in word.bytes() {
                h ^= u64::from(b);
                h = h.wrapping_mul(0x0100_0000_01b3);
            }
            #[allow(clippy::cast_possible_truncation)]
            let idx = (h % dim as u64) as usize;
            v[idx] += 1.0;
        }
        v
    }
}

impl LlmProvider for MockProvider {
    async fn chat(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<String, LlmError> {
        self.record_call(messages, options).await;
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        Ok(self.next_response())
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<ChatStream, LlmError> {
        self.record_call(messages, options).await;
        if self.fail_stream_open {
            return Err(LlmError::Unavailable);
        }
        let fragments = match &self.stream_fragments {
            Some(f) => f.clone(),
            None => self
                .next_response()
                .split_inclusive(' ')
                .map(str::to_owned)
                .collect(),
        };
        let mut items: Vec<Result<String, LlmError>> = match self.stream_fail_after {
            Some(n) => fragments.into_iter().take(n).map(Ok).collect(),
            None => fragments.into_iter().map(Ok).collect(),
        };
        if self.stream_fail_after.is_some() {
            items.push(Err(LlmError::Other("mock stream interrupted".into())));
        }
        Ok(Box::pin(TrackedStream {
            inner: Box::pin(tokio_stream::iter(items)),
            dropped: Arc::clone(&self.stream_dropped),
        }))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut out = self.embed_batch(&[text.to_owned()]).await?;
        out.pop().ok_or(LlmError::EmptyResponse {
            provider: "mock".into(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if !self.supports_embeddings {
            return Err(LlmError::EmbedUnsupported {
                provider: "mock".into(),
            });
        }
        let remaining = self.embed_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.embed_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(LlmError::Unavailable);
        }
        Ok(texts
            .iter()
            .map(|t| match &self.embedding {
                Some(v) => v.clone(),
                None => self.hashed_embedding(t),
            })
            .collect())
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

struct TrackedStream {
    inner: ChatStream,
    dropped: Arc<AtomicBool>,
}

impl Stream for TrackedStream {
    type Item = Result<String, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;

    use super::*;

    async fn collect(provider: &MockProvider) -> Vec<Result<String, LlmError>> {
        let stream = provider
            .chat_stream(&[Message::user("hi")], &GenerateOptions::default())
            .await
            .unwrap();
        stream.collect().await
    }

    #[tokio::test]
    async fn responses_are_consumed_in_order() {
        let p = MockProvider::with_responses(vec!["one".into(), "two".into()]);
        let opts = GenerateOptions::default();
        assert_eq!(p.chat(&[], &opts).await.unwrap(), "one");
        assert_eq!(p.chat(&[], &opts).await.unwrap(), "two");
        assert_eq!(p.chat(&[], &opts).await.unwrap(), "mock response");
        assert_eq!(p.chat_calls(), 3);
    }

    #[tokio::test]
    async fn stream_splits_response_on_spaces() {
        let p = MockProvider::with_responses(vec!["a b c".into()]);
        let items: Vec<String> = collect(&p).await.into_iter().map(Result::unwrap).collect();
        assert_eq!(items, vec!["a ", "b ", "c"]);
        assert!(p.stream_dropped());
    }

    #[tokio::test]
    async fn stream_failure_after_n_fragments() {
        let p = MockProvider::default()
            .with_stream_fragments(vec!["x".into(), "y".into(), "z".into()])
            .with_stream_failure_after(2);
        let items = collect(&p).await;
        assert_eq!(items.len(), 3);
        assert!(items[2].is_err());
    }

    #[tokio::test]
    async fn embed_failures_are_consumed() {
        let p = MockProvider::default().with_embed_failures(1);
        assert!(p.embed("x").await.is_err());
        assert_eq!(p.embed("x").await.unwrap().len(), DEFAULT_DIMENSION);
        assert_eq!(p.embed_calls(), 2);
    }

    #[tokio::test]
    async fn hashed_embedding_is_deterministic() {
        let p = MockProvider::default();
        let a = p.embed("Rust borrow checker").await.unwrap();
        let b = p.embed("rust BORROW checker").await.unwrap();
        assert_eq!(a, b);
    }
}
