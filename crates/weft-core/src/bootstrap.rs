//! Application bootstrap: config resolution, provider, store and registry construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use weft_llm::AnyProvider;
use weft_llm::compatible::CompatibleProvider;
use weft_llm::ollama::OllamaProvider;
use weft_llm::openai::OpenAiProvider;
use weft_memory::{
    ChunkStrategy, ConversationStore, DocumentIngestionPipeline, EmbeddingService,
    SemanticChunker, SqliteStore, VectorStore, create_vector_store,
};

use crate::assistant::{Assistant, AssistantSpec};
use crate::config::{AssistantConfig, ChunkingMode, Config, ProviderKind, RagKindConfig};
use crate::rag::{DEFAULT_TOP_K, KeywordRag, RagBackend, RagDocument, VectorRag};
use crate::registry::AssistantRegistry;

/// Name of the assistant registered when the config declares none.
pub const DEFAULT_ASSISTANT: &str = "default";

pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

impl AppBuilder {
    /// Resolve the config path, load and validate the config.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be read, parsed or validated.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_path(resolve_config_path())
    }

    /// # Errors
    ///
    /// Returns an error if the config cannot be read, parsed or validated.
    pub fn from_path(config_path: PathBuf) -> anyhow::Result<Self> {
        let config = Config::load(&config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?;
        Self::new(config, config_path)
    }

    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: Config, config_path: PathBuf) -> anyhow::Result<Self> {
        config.validate().context("invalid configuration")?;
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// # Errors
    ///
    /// Returns an error if the provider cannot be constructed.
    pub fn build_provider(&self) -> anyhow::Result<AnyProvider> {
        create_provider(&self.config)
    }

    pub fn build_embedding_service(&self, provider: &AnyProvider) -> EmbeddingService {
        create_embedding_service(&self.config, provider)
    }

    /// # Errors
    ///
    /// Returns an error for an unknown backend or an unreachable Qdrant URL.
    pub fn build_vector_store(&self) -> anyhow::Result<Arc<dyn VectorStore>> {
        create_vector_store(&self.config.vector_store).context("failed to create vector store")
    }

    /// Open the SQLite database, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn build_sqlite_store(&self) -> anyhow::Result<SqliteStore> {
        let path = &self.config.ingestion.sqlite_path;
        if path != ":memory:"
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        SqliteStore::new(path)
            .await
            .with_context(|| format!("failed to open sqlite database {path}"))
    }

    pub fn build_ingestion_pipeline(
        &self,
        embeddings: EmbeddingService,
        store: SqliteStore,
        vector_store: Option<Arc<dyn VectorStore>>,
    ) -> DocumentIngestionPipeline {
        create_ingestion_pipeline(&self.config, embeddings, Arc::new(store), vector_store)
    }
}

/// Priority: `--config` argument, then `WEFT_CONFIG`, then `config/default.toml`.
pub fn resolve_config_path() -> PathBuf {
    let args: Vec<String> = std::env::args().collect();
    if let Some(path) = args.windows(2).find(|w| w[0] == "--config").map(|w| &w[1]) {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("WEFT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

/// # Errors
///
/// Returns an error if the provider needs an API key that is not configured.
pub fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    create_provider_with(config, config.llm.provider, &config.llm.model)
}

/// Build a provider of `kind` serving `model`, with everything else taken from `[llm]`.
///
/// # Errors
///
/// Returns an error if the provider needs an API key that is not configured.
pub fn create_provider_with(
    config: &Config,
    kind: ProviderKind,
    model: &str,
) -> anyhow::Result<AnyProvider> {
    let llm = &config.llm;
    let embedding_model = Some(llm.embedding_model.clone()).filter(|m| !m.is_empty());
    let provider = match kind {
        ProviderKind::Ollama => AnyProvider::Ollama(OllamaProvider::new(
            &llm.base_url,
            model.to_owned(),
            llm.embedding_model.clone(),
        )),
        ProviderKind::OpenAi => {
            let api_key = llm
                .api_key
                .clone()
                .context("WEFT_LLM_API_KEY or llm.api_key required for openai provider")?;
            AnyProvider::OpenAi(
                OpenAiProvider::new(
                    api_key,
                    llm.base_url.clone(),
                    model.to_owned(),
                    llm.max_tokens,
                    embedding_model,
                )
                .context("failed to create openai provider")?,
            )
        }
        ProviderKind::Compatible => AnyProvider::Compatible(
            CompatibleProvider::new(
                kind.as_str().to_owned(),
                llm.api_key.clone().unwrap_or_default(),
                llm.base_url.clone(),
                model.to_owned(),
                llm.max_tokens,
                embedding_model,
            )
            .context("failed to create compatible provider")?,
        ),
    };
    tracing::debug!(provider = %kind, model, "LLM provider created");
    Ok(provider)
}

pub fn create_embedding_service(config: &Config, provider: &AnyProvider) -> EmbeddingService {
    EmbeddingService::from_provider(provider)
        .with_retry(config.embedding.retry_policy())
        .with_batch_size(config.embedding.batch_size)
}

pub fn create_ingestion_pipeline(
    config: &Config,
    embeddings: EmbeddingService,
    store: Arc<dyn weft_memory::DocumentStore>,
    vector_store: Option<Arc<dyn VectorStore>>,
) -> DocumentIngestionPipeline {
    let strategy = match config.embedding.chunking {
        ChunkingMode::Tokens => ChunkStrategy::TokenWindow,
        ChunkingMode::Semantic => ChunkStrategy::Semantic(SemanticChunker::default()),
    };
    let pipeline = DocumentIngestionPipeline::new(embeddings, store)
        .with_limits(config.ingestion.limits())
        .with_strategy(strategy);
    match vector_store {
        Some(vs) => pipeline.with_vector_store(vs),
        None => pipeline,
    }
}

/// Shared services every configured assistant is wired to.
#[derive(Clone)]
pub struct RegistryDeps {
    pub provider: AnyProvider,
    pub embeddings: EmbeddingService,
    pub vector_store: Arc<dyn VectorStore>,
    pub conversations: Option<Arc<dyn ConversationStore>>,
}

/// Create one assistant per `[[assistants]]` entry, or a single [`DEFAULT_ASSISTANT`].
///
/// Saved conversations are restored when `conversations` is set.
///
/// # Errors
///
/// Returns an error if an assistant, its provider or one of its RAG bindings cannot be built.
pub async fn build_registry(
    config: &Config,
    deps: &RegistryDeps,
) -> anyhow::Result<AssistantRegistry> {
    let registry = AssistantRegistry::new();
    if config.assistants.is_empty() {
        let spec = AssistantSpec::new(DEFAULT_ASSISTANT).with_max_history(config.assistant.max_history);
        let assistant = build_assistant(config, spec, deps.provider.clone(), deps).await?;
        registry.insert(assistant)?;
        return Ok(registry);
    }

    for entry in &config.assistants {
        let provider = assistant_provider(config, entry, &deps.provider)?;
        let assistant =
            build_assistant(config, entry.to_spec(&config.assistant), provider, deps).await?;

        for binding in &entry.rag {
            let backend: Arc<dyn RagBackend> = match &binding.kind {
                RagKindConfig::Keyword { documents } => Arc::new(
                    KeywordRag::with_documents(
                        documents
                            .iter()
                            .map(|d| RagDocument::new(d.id.clone(), d.content.clone())),
                    )
                    .with_name(binding.name.clone()),
                ),
                RagKindConfig::Vector { top_k } => Arc::new(
                    VectorRag::new(deps.embeddings.clone(), Arc::clone(&deps.vector_store))
                        .with_top_k(top_k.unwrap_or(DEFAULT_TOP_K))
                        .with_chunking(config.embedding.chunk_size, config.embedding.chunk_overlap),
                ),
            };
            assistant
                .add_rag_system(backend, binding.name.clone(), binding.weight, binding.enabled)
                .with_context(|| {
                    format!("assistant `{}`: RAG binding `{}`", entry.name, binding.name)
                })?;
        }
        registry.insert(assistant)?;
    }
    Ok(registry)
}

fn assistant_provider(
    config: &Config,
    entry: &AssistantConfig,
    shared: &AnyProvider,
) -> anyhow::Result<AnyProvider> {
    if entry.provider.is_none() && entry.model.is_none() {
        return Ok(shared.clone());
    }
    let kind = entry.provider.unwrap_or(config.llm.provider);
    let model = entry.model.as_deref().unwrap_or(&config.llm.model);
    create_provider_with(config, kind, model)
        .with_context(|| format!("assistant `{}`: provider", entry.name))
}

async fn build_assistant(
    config: &Config,
    spec: AssistantSpec,
    provider: AnyProvider,
    deps: &RegistryDeps,
) -> anyhow::Result<Assistant> {
    let name = spec.name.clone();
    let mut assistant = Assistant::new(spec, provider)
        .with_context(|| format!("assistant `{name}`"))?
        .with_rag_timeout(config.assistant.rag_timeout());
    if let Some(store) = &deps.conversations {
        assistant = assistant.with_conversation_store(Arc::clone(store));
        let restored = assistant
            .load_history()
            .await
            .with_context(|| format!("assistant `{name}`: failed to restore history"))?;
        if restored > 0 {
            tracing::info!(assistant = %name, turns = restored, "conversation restored");
        }
    }
    Ok(assistant)
}
