mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Retrieval-augmented chat over several weighted knowledge sources.
#[derive(Parser)]
#[command(name = "weft", version)]
struct Cli {
    /// Path to the TOML configuration file.
    ///
    /// Falls back to `WEFT_CONFIG`, then `config/default.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask an assistant. Reads one message per line from stdin when MESSAGE is omitted.
    Chat {
        /// Assistant to talk to. Defaults to the first configured one.
        #[arg(long)]
        assistant: Option<String>,

        /// Print the reply as it is generated.
        #[arg(long)]
        stream: bool,

        /// Ingest these files into the shared vector store before chatting.
        #[arg(long = "ingest", value_name = "PATH")]
        ingest: Vec<PathBuf>,

        message: Option<String>,
    },

    /// Ingest documents into the SQLite store.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Owner recorded on the documents. Defaults to `ingestion.default_owner`.
        #[arg(long)]
        owner: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(weft_core::bootstrap::resolve_config_path);
    let app = weft_core::bootstrap::AppBuilder::from_path(config_path)?;

    match cli.command {
        Command::Chat {
            assistant,
            stream,
            ingest,
            message,
        } => {
            commands::chat(
                &app,
                commands::ChatArgs {
                    assistant,
                    stream,
                    ingest,
                    message,
                },
            )
            .await
        }
        Command::Ingest { paths, owner } => commands::ingest(&app, &paths, owner).await,
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
