//! The assistant engine: retrieval, prompt composition, generation and history.

mod stream;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use weft_llm::{AnyProvider, ChatStream, GenerateOptions, LlmError, LlmProvider};
use weft_memory::{ConversationHistory, ConversationStore, ConversationTurn, StoreError};

pub use stream::{Fragment, ReplyStream};
use stream::ExchangeRecorder;

use crate::prompt;
use crate::rag::{RagBackend, RagBinding, RagError, RagOrchestrator, RagOutcome};

pub const DEFAULT_MAX_HISTORY: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Rag(#[from] RagError),

    #[error("conversation store failed: {0}")]
    Store(#[from] StoreError),

    #[error("invalid option `{key}`: {reason}")]
    InvalidOption { key: String, reason: String },
}

/// Identity and behaviour of one assistant.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantSpec {
    pub name: String,
    pub system_message: Option<String>,
    /// Free-form settings. `temperature` and `max_tokens` are passed to the model.
    pub options: HashMap<String, serde_json::Value>,
    /// Prior turns included in each prompt. `0` sends the whole history.
    pub max_history: usize,
}

impl AssistantSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_message: None,
            options: HashMap::new(),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    #[must_use]
    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Sampling options derived from `temperature` and `max_tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::InvalidOption`] when either key has the wrong type or range.
    pub fn generate_options(&self) -> Result<GenerateOptions, AssistantError> {
        let invalid = |key: &str, reason: &str| AssistantError::InvalidOption {
            key: key.to_owned(),
            reason: reason.to_owned(),
        };
        let temperature = match self.options.get("temperature") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => {
                let t = v
                    .as_f64()
                    .ok_or_else(|| invalid("temperature", "expected a number"))?;
                if !(0.0..=2.0).contains(&t) {
                    return Err(invalid("temperature", "must be between 0 and 2"));
                }
                #[allow(clippy::cast_possible_truncation)]
                Some(t as f32)
            }
        };
        let max_tokens = match self.options.get("max_tokens") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| invalid("max_tokens", "expected a positive integer"))?,
            ),
        };
        Ok(GenerateOptions {
            temperature,
            max_tokens,
        })
    }
}

/// What [`Assistant::process_message`] hands back.
#[derive(Debug)]
pub enum Reply {
    Text(String),
    Stream(ReplyStream),
}

/// A configured assistant with its retrieval bindings and conversation history.
///
/// Safe to share between concurrent requests: each completed exchange is committed to the
/// history in one critical section.
pub struct Assistant<P: LlmProvider + Clone + 'static = AnyProvider> {
    spec: AssistantSpec,
    options: GenerateOptions,
    provider: P,
    orchestrator: RagOrchestrator,
    history: Arc<Mutex<ConversationHistory>>,
    store: Option<Arc<dyn ConversationStore>>,
}

impl<P: LlmProvider + Clone + 'static> std::fmt::Debug for Assistant<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("name", &self.spec.name)
            .field("provider", &self.provider.name())
            .field("rag", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider + Clone + 'static> Assistant<P> {
    /// # Errors
    ///
    /// Returns [`AssistantError::InvalidOption`] if the spec's model options are malformed.
    pub fn new(spec: AssistantSpec, provider: P) -> Result<Self, AssistantError> {
        let options = spec.generate_options()?;
        let history = ConversationHistory::with_limit(spec.max_history);
        Ok(Self {
            spec,
            options,
            provider,
            orchestrator: RagOrchestrator::new(),
            history: Arc::new(Mutex::new(history)),
            store: None,
        })
    }

    /// Per-backend retrieval time limit.
    #[must_use]
    pub fn with_rag_timeout(mut self, timeout: Duration) -> Self {
        self.orchestrator = self.orchestrator.with_timeout(timeout);
        self
    }

    /// Save every completed exchange to `store`.
    #[must_use]
    pub fn with_conversation_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    #[must_use]
    pub fn spec(&self) -> &AssistantSpec {
        &self.spec
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Replace the in-memory history with the turns saved in the conversation store.
    /// Returns how many turns were read; only the last `max_history` are kept in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn load_history(&self) -> Result<usize, AssistantError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let turns = store.load_turns(&self.spec.name).await?;
        let count = turns.len();
        self.lock_history().replace(turns);
        tracing::debug!(assistant = %self.spec.name, turns = count, "history restored");
        Ok(count)
    }

    /// # Errors
    ///
    /// Returns [`RagError::InvalidWeight`] or [`RagError::DuplicateBinding`].
    pub fn add_rag_system(
        &self,
        backend: Arc<dyn RagBackend>,
        name: impl Into<String>,
        weight: f32,
        enabled: bool,
    ) -> Result<(), AssistantError> {
        let binding = RagBinding::new(backend, name, weight, enabled)?;
        self.orchestrator.add(binding)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`RagError::UnknownBinding`] if no binding has this name.
    pub fn enable_rag_system(&self, name: &str) -> Result<(), AssistantError> {
        self.orchestrator.enable(name)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`RagError::UnknownBinding`] if no binding has this name.
    pub fn disable_rag_system(&self, name: &str) -> Result<(), AssistantError> {
        self.orchestrator.disable(name)?;
        Ok(())
    }

    #[must_use]
    pub fn rag_bindings(&self) -> Vec<RagBinding> {
        self.orchestrator.bindings()
    }

    #[must_use]
    pub fn orchestrator(&self) -> &RagOrchestrator {
        &self.orchestrator
    }

    /// Snapshot of the conversation so far.
    #[must_use]
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.lock_history().turns().to_vec()
    }

    /// Forget the in-memory conversation and, if configured, the saved one.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation store cannot be cleared.
    pub async fn clear_history(&self) -> Result<(), AssistantError> {
        if let Some(store) = &self.store {
            store.clear_turns(&self.spec.name).await?;
        }
        self.lock_history().clear();
        Ok(())
    }

    /// Answer `message`, as full text or as a fragment stream.
    ///
    /// # Errors
    ///
    /// In batch mode a model failure is returned as [`AssistantError::Llm`]. In streaming mode
    /// model failures arrive in-band as [`Fragment::Error`] and this never fails.
    pub async fn process_message(
        &self,
        message: &str,
        stream: bool,
    ) -> Result<Reply, AssistantError> {
        if stream {
            Ok(Reply::Stream(self.chat_stream(message).await))
        } else {
            self.chat(message).await.map(Reply::Text)
        }
    }

    /// Batch reply. The exchange is recorded only when generation succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Llm`] if the model fails and [`AssistantError::Store`] if
    /// the exchange cannot be saved.
    pub async fn chat(&self, message: &str) -> Result<String, AssistantError> {
        let (messages, recorder) = self.prepare(message).await;
        let text = self.provider.chat(&messages, &self.options).await?;

        let reply = ConversationTurn::assistant(text.clone());
        if let Some(save) = recorder.save(&reply) {
            save.await?;
        }
        recorder.commit(reply);
        Ok(text)
    }

    /// Streamed reply. See [`ReplyStream`] for how the exchange is recorded.
    pub async fn chat_stream(&self, message: &str) -> ReplyStream {
        let (messages, recorder) = self.prepare(message).await;
        let inner: ChatStream = if self.provider.supports_streaming() {
            match self.provider.chat_stream(&messages, &self.options).await {
                Ok(stream) => stream,
                Err(e) => Box::pin(futures::stream::once(async move { Err(e) })),
            }
        } else {
            let result = self.provider.chat(&messages, &self.options).await;
            Box::pin(futures::stream::once(async move { result }))
        };
        ReplyStream::new(inner, recorder)
    }

    async fn prepare(&self, message: &str) -> (Vec<weft_llm::Message>, ExchangeRecorder) {
        let RagOutcome {
            combined_context,
            results,
            failures,
        } = self.orchestrator.query(message).await;
        if !failures.is_empty() {
            tracing::debug!(
                assistant = %self.spec.name,
                used = results.len(),
                failed = failures.len(),
                "retrieval partially failed"
            );
        }

        let messages = {
            let history = self.lock_history();
            prompt::compose(
                self.spec.system_message.as_deref(),
                history.window(self.spec.max_history),
                &combined_context,
                message,
            )
        };
        tracing::debug!(
            assistant = %self.spec.name,
            messages = messages.len(),
            chars = messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "prompt built"
        );

        let recorder = ExchangeRecorder {
            assistant: self.spec.name.clone(),
            history: Arc::clone(&self.history),
            store: self.store.clone(),
            user: ConversationTurn::user(message),
        };
        (messages, recorder)
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, ConversationHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
