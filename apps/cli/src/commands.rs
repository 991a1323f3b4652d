//! CLI command definitions, routing, and tracing setup.

use std::collections::HashMap;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use threadline_core::{ExtractionPipeline, RetryPolicy, chunk};
use threadline_llm::{AnthropicClient, AnthropicExtractor};
use threadline_shared::{
    AppConfig, ConversationArtifact, ConversationId, init_config, load_config, validate_api_key,
};
use threadline_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Threadline — turn conversation transcripts into thread graphs.
#[derive(Parser)]
#[command(
    name = "threadline",
    version,
    about = "Build conversational-thread graphs from transcripts, live or batch.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start the HTTP + websocket server.
    Serve {
        /// Bind host (overrides config).
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Process a transcript file into a thread graph.
    Process {
        /// Path to the transcript text file.
        file: String,

        /// Name for the stored conversation (defaults to the file name).
        #[arg(short, long)]
        name: Option<String>,

        /// Chunk size in tokens (overrides config).
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Chunk overlap in tokens (overrides config).
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// List all stored conversations.
    List,

    /// Print a stored conversation's graph as JSON.
    Show {
        /// Conversation ID.
        id: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "threadline=info",
        1 => "threadline=debug",
        _ => "threadline=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve { host, port } => cmd_serve(host, port).await,
        Command::Process {
            file,
            name,
            chunk_size,
            overlap,
        } => cmd_process(&file, name.as_deref(), chunk_size, overlap).await,
        Command::List => cmd_list().await,
        Command::Show { id } => cmd_show(&id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = load_config()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    info!(
        host = %config.server.host,
        port = config.server.port,
        "starting server"
    );

    threadline_live::serve(config).await?;
    Ok(())
}

async fn cmd_process(
    file: &str,
    name: Option<&str>,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
) -> Result<()> {
    let config = load_config()?;
    let api_key = validate_api_key(&config.anthropic.api_key_env)?;

    let transcript = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read transcript '{file}': {e}"))?;
    if transcript.trim().is_empty() {
        return Err(eyre!("transcript '{file}' is empty"));
    }

    let size = chunk_size.unwrap_or(config.defaults.chunk_size);
    let overlap = overlap.unwrap_or(config.defaults.chunk_overlap);
    let chunks = chunk(&transcript, size, overlap)?;

    let file_name = name
        .map(String::from)
        .unwrap_or_else(|| file.rsplit('/').next().unwrap_or(file).to_string());

    info!(
        file,
        chunks = chunks.len(),
        chunk_size = size,
        overlap,
        "processing transcript"
    );

    let client = AnthropicClient::new(&config.anthropic, api_key)?;
    let extractor = Arc::new(AnthropicExtractor::new(client));
    let pipeline = ExtractionPipeline::new(extractor, RetryPolicy::from(&config.retry));

    let bar = ProgressBar::new(chunks.len() as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:30.cyan/dim}] chunk {pos}/{len} — {msg}",
        )
        .unwrap()
        .progress_chars("=> "),
    );

    let mut snapshots: Vec<Vec<threadline_shared::Node>> = Vec::new();
    let mut failed = 0usize;
    let graph = pipeline
        .run(&chunks, |update| {
            if let Some(err) = &update.error {
                failed += 1;
                bar.set_message(err.clone());
            } else {
                bar.set_message(format!("{} nodes", update.existing_json.len()));
            }
            snapshots.push(update.existing_json.clone());
            bar.inc(1);
        })
        .await;
    bar.finish_and_clear();

    let conversation_id = ConversationId::new();
    let chunk_texts: HashMap<String, String> = chunks.chunk_dict();
    let artifact = ConversationArtifact {
        file_name,
        conversation_id,
        chunks: chunk_texts,
        graph_data: snapshots,
    };

    let storage_root = threadline_live::server::expand_home(&config.defaults.output_dir)?;
    let storage = Storage::open(&storage_root).await?;
    let meta = storage.save_conversation(&artifact).await?;

    println!();
    println!("  Conversation processed!");
    println!("  ID:      {}", meta.id);
    println!("  Name:    {}", meta.file_name);
    println!("  Chunks:  {}", chunks.len());
    println!("  Nodes:   {}", graph.len());
    if failed > 0 {
        println!("  Failed:  {failed} chunk(s) skipped after retries");
    }
    println!("  Path:    {}", meta.storage_path);
    println!();

    Ok(())
}

async fn cmd_list() -> Result<()> {
    let config = load_config()?;
    let storage_root = threadline_live::server::expand_home(&config.defaults.output_dir)?;
    let storage = Storage::open(&storage_root).await?;

    let conversations = storage.list_conversations().await?;
    if conversations.is_empty() {
        println!("No stored conversations.");
        return Ok(());
    }

    println!(
        "{:<38} {:<28} {:>6}  {}",
        "ID", "NAME", "NODES", "CREATED"
    );
    for meta in conversations {
        println!(
            "{:<38} {:<28} {:>6}  {}",
            meta.id,
            meta.file_name,
            meta.no_of_nodes,
            meta.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

async fn cmd_show(id: &str) -> Result<()> {
    let config = load_config()?;
    let storage_root = threadline_live::server::expand_home(&config.defaults.output_dir)?;
    let storage = Storage::open(&storage_root).await?;

    let meta = storage
        .get_conversation(id)
        .await?
        .ok_or_else(|| eyre!("no conversation with id '{id}'"))?;
    let artifact = storage.read_artifact(&meta)?;
    println!("{}", serde_json::to_string_pretty(&artifact)?);

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
