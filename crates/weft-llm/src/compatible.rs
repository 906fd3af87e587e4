use std::fmt;

use crate::error::LlmError;
use crate::openai::OpenAiProvider;
use crate::provider::{ChatStream, GenerateOptions, LlmProvider, Message};

/// OpenAI wire protocol under a custom provider name (Groq, vLLM, LM Studio, ...).
#[derive(Clone)]
pub struct CompatibleProvider {
    inner: OpenAiProvider,
    provider_name: String,
}

impl CompatibleProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        provider_name: String,
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
        embedding_model: Option<String>,
    ) -> Result<Self, LlmError> {
        let inner = OpenAiProvider::new(api_key, base_url, model, max_tokens, embedding_model)?;
        Ok(Self {
            inner,
            provider_name,
        })
    }
}

impl fmt::Debug for CompatibleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompatibleProvider")
            .field("provider_name", &self.provider_name)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl LlmProvider for CompatibleProvider {
    async fn chat(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<String, LlmError> {
        self.inner.chat(messages, options).await
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<ChatStream, LlmError> {
        self.inner.chat_stream(messages, options).await
    }

    fn supports_streaming(&self) -> bool {
        self.inner.supports_streaming()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.inner.embed_batch(texts).await
    }

    fn supports_embeddings(&self) -> bool {
        self.inner.supports_embeddings()
    }

    fn name(&self) -> &str {
        &self.provider_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider(embedding_model: Option<&str>) -> CompatibleProvider {
        CompatibleProvider::new(
            "groq".into(),
            "key".into(),
            "https://api.groq.com/openai/v1".into(),
            "llama-3.3-70b".into(),
            4096,
            embedding_model.map(Into::into),
        )
        .unwrap()
    }

    #[test]
    fn name_returns_custom_provider_name() {
        assert_eq!(test_provider(None).name(), "groq");
    }

    #[test]
    fn embeddings_follow_inner_model() {
        assert!(!test_provider(None).supports_embeddings());
        assert!(test_provider(Some("nomic-embed")).supports_embeddings());
    }

    #[test]
    fn debug_includes_name_not_key() {
        let dbg = format!("{:?}", test_provider(None));
        assert!(dbg.contains("groq"));
        assert!(!dbg.contains("\"key\""));
    }
}
