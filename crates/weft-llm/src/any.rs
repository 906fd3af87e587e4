use std::sync::Arc;

use crate::compatible::CompatibleProvider;
use crate::error::LlmError;
#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::provider::{
    ChatStream, EmbedBatchFuture, GenerateOptions, LlmProvider, Message,
};

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given expression for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::Ollama($p) => $expr,
            AnyProvider::OpenAi($p) => $expr,
            AnyProvider::Compatible($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyProvider {
    Ollama(OllamaProvider),
    OpenAi(OpenAiProvider),
    Compatible(CompatibleProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl AnyProvider {
    /// Return a cloneable closure that calls `embed_batch()` on this provider.
    pub fn embed_batch_fn(&self) -> impl Fn(Vec<String>) -> EmbedBatchFuture + Send + Sync + 'static {
        let provider = Arc::new(self.clone());
        move |texts: Vec<String>| -> EmbedBatchFuture {
            let p = Arc::clone(&provider);
            Box::pin(async move { p.embed_batch(&texts).await })
        }
    }
}

impl LlmProvider for AnyProvider {
    async fn chat(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<String, LlmError> {
        delegate_provider!(self, |p| p.chat(messages, options).await)
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<ChatStream, LlmError> {
        delegate_provider!(self, |p| p.chat_stream(messages, options).await)
    }

    fn supports_streaming(&self) -> bool {
        delegate_provider!(self, |p| p.supports_streaming())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        delegate_provider!(self, |p| p.embed(text).await)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        delegate_provider!(self, |p| p.embed_batch(texts).await)
    }

    fn supports_embeddings(&self) -> bool {
        delegate_provider!(self, |p| p.supports_embeddings())
    }

    fn name(&self) -> &str {
        delegate_provider!(self, |p| p.name())
    }
}
