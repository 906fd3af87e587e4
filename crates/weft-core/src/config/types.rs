use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use weft_memory::{IngestionLimits, RetryPolicy, VectorStoreConfig};

use crate::assistant::{AssistantSpec, DEFAULT_MAX_HISTORY};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub assistant: AssistantDefaults,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assistants: Vec<AssistantConfig>,
}

/// LLM provider backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    OpenAi,
    Compatible,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Compatible => "compatible",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "llama3.2".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Only needed for `openai` and `compatible`. Prefer `WEFT_LLM_API_KEY`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

fn default_rag_timeout_secs() -> u64 {
    30
}

/// Settings shared by every assistant unless overridden per assistant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssistantDefaults {
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_rag_timeout_secs")]
    pub rag_timeout_secs: u64,
    /// Save conversations to the SQLite store and restore them at startup.
    #[serde(default)]
    pub persist_history: bool,
}

impl Default for AssistantDefaults {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            rag_timeout_secs: default_rag_timeout_secs(),
            persist_history: false,
        }
    }
}

impl AssistantDefaults {
    #[must_use]
    pub fn rag_timeout(&self) -> Duration {
        Duration::from_secs(self.rag_timeout_secs)
    }
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_batch_size() -> usize {
    64
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    4000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingMode {
    #[default]
    Tokens,
    Semantic,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default)]
    pub chunking: ChunkingMode,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            chunking: ChunkingMode::default(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl EmbeddingConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

fn default_max_file_size() -> u64 {
    IngestionLimits::default().max_file_size
}

fn default_allowed_extensions() -> Vec<String> {
    IngestionLimits::default().allowed_extensions
}

fn default_sqlite_path() -> String {
    "data/weft.db".into()
}

fn default_owner() -> String {
    "local".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IngestionConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_owner")]
    pub default_owner: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
            sqlite_path: default_sqlite_path(),
            default_owner: default_owner(),
        }
    }
}

impl IngestionConfig {
    #[must_use]
    pub fn limits(&self) -> IngestionLimits {
        IngestionLimits {
            max_file_size: self.max_file_size,
            allowed_extensions: self.allowed_extensions.clone(),
        }
    }
}

/// One `[[assistants]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssistantConfig {
    pub name: String,
    #[serde(default)]
    pub system_message: Option<String>,
    /// Overrides `llm.provider` for this assistant.
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    /// Overrides `llm.model` for this assistant.
    #[serde(default)]
    pub model: Option<String>,
    /// Overrides `assistant.max_history`.
    #[serde(default)]
    pub max_history: Option<usize>,
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub rag: Vec<RagBindingConfig>,
}

impl AssistantConfig {
    #[must_use]
    pub fn to_spec(&self, defaults: &AssistantDefaults) -> AssistantSpec {
        AssistantSpec {
            name: self.name.clone(),
            system_message: self.system_message.clone(),
            options: self.options.clone(),
            max_history: self.max_history.unwrap_or(defaults.max_history),
        }
    }
}

fn default_weight() -> f32 {
    1.0
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RagBindingConfig {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: RagKindConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RagKindConfig {
    Keyword {
        #[serde(default)]
        documents: Vec<InlineDocument>,
    },
    /// Searches the shared vector store.
    Vector {
        #[serde(default)]
        top_k: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InlineDocument {
    pub id: String,
    pub content: String,
}
