use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use weft_core::bootstrap::{AppBuilder, RegistryDeps, build_registry};
use weft_core::{Assistant, Fragment, Reply};
use weft_memory::{ConversationStore, DocumentIngestionPipeline};

pub struct ChatArgs {
    pub assistant: Option<String>,
    pub stream: bool,
    pub ingest: Vec<PathBuf>,
    pub message: Option<String>,
}

pub async fn chat(app: &AppBuilder, args: ChatArgs) -> anyhow::Result<()> {
    let config = app.config();
    let provider = app.build_provider()?;
    let embeddings = app.build_embedding_service(&provider);
    let vector_store = app.build_vector_store()?;

    let sqlite = if config.assistant.persist_history || !args.ingest.is_empty() {
        Some(app.build_sqlite_store().await?)
    } else {
        None
    };

    if let Some(store) = &sqlite
        && !args.ingest.is_empty()
    {
        let pipeline = app.build_ingestion_pipeline(
            embeddings.clone(),
            store.clone(),
            Some(Arc::clone(&vector_store)),
        );
        ingest_all(app, &pipeline, &args.ingest, &config.ingestion.default_owner).await?;
    }

    let conversations = sqlite
        .filter(|_| config.assistant.persist_history)
        .map(|s| Arc::new(s) as Arc<dyn ConversationStore>);
    let deps = RegistryDeps {
        provider,
        embeddings,
        vector_store,
        conversations,
    };
    let registry = build_registry(config, &deps).await?;

    let name = match args.assistant {
        Some(name) => name,
        None => registry
            .list()
            .into_iter()
            .next()
            .context("no assistants configured")?,
    };
    let Some(assistant) = registry.get(&name) else {
        bail!(
            "unknown assistant `{name}` (available: {})",
            registry.list().join(", ")
        );
    };

    if let Some(message) = args.message {
        return answer(&assistant, &message, args.stream).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = answer(&assistant, line, args.stream).await {
            tracing::error!("{e:#}");
        }
    }
    Ok(())
}

async fn answer(assistant: &Assistant, message: &str, stream: bool) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    match assistant.process_message(message, stream).await? {
        Reply::Text(text) => {
            stdout.write_all(text.as_bytes()).await?;
        }
        Reply::Stream(mut fragments) => {
            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Fragment::Text(text) => {
                        stdout.write_all(text.as_bytes()).await?;
                        stdout.flush().await?;
                    }
                    Fragment::Error(e) => {
                        stdout.write_all(b"\n").await?;
                        stdout.flush().await?;
                        bail!("reply interrupted: {e}");
                    }
                }
            }
        }
    }
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

pub async fn ingest(app: &AppBuilder, paths: &[PathBuf], owner: Option<String>) -> anyhow::Result<()> {
    let provider = app.build_provider()?;
    let embeddings = app.build_embedding_service(&provider);
    let store = app.build_sqlite_store().await?;
    let pipeline = app.build_ingestion_pipeline(embeddings, store, None);
    let owner = owner.unwrap_or_else(|| app.config().ingestion.default_owner.clone());
    ingest_all(app, &pipeline, paths, &owner).await
}

async fn ingest_all(
    app: &AppBuilder,
    pipeline: &DocumentIngestionPipeline,
    paths: &[PathBuf],
    owner: &str,
) -> anyhow::Result<()> {
    let embedding = &app.config().embedding;
    let mut failed = 0usize;
    for path in paths {
        match pipeline
            .ingest_file(path, owner, embedding.chunk_size, embedding.chunk_overlap)
            .await
        {
            Ok(outcome) => {
                let note = if outcome.deduplicated {
                    " (already ingested)"
                } else {
                    ""
                };
                println!(
                    "{}: {} chunk(s){note}",
                    path.display(),
                    outcome.chunks.len()
                );
            }
            Err(e) => {
                failed += 1;
                tracing::error!(path = %path.display(), "ingestion failed: {e}");
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} file(s) failed to ingest", paths.len());
    }
    Ok(())
}
