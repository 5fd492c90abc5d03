use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::answer::LanguageModel;
use crate::config::Config;
use crate::config::settings::{LEGACY_STORE_URI_ENV, STORE_URI_ENV, legacy_store_uri_ignored};
use crate::database::{IndexSpec, IndexStatus, LanceVectorStore, VectorStore};
use crate::embeddings::{Embedder, GeminiClient};
use crate::indexer::Indexer;
use crate::qa::QaService;
use crate::{bounded, server};

async fn open_store(config: &Config) -> Result<Arc<LanceVectorStore>> {
    let store = LanceVectorStore::new(config)
        .await
        .context("Failed to connect to vector store")?;
    Ok(Arc::new(store))
}

fn gemini_client(config: &Config) -> Result<Arc<GeminiClient>> {
    config.require_api_key()?;
    let client = GeminiClient::new(&config.gemini).context("Failed to create Gemini client")?;
    Ok(Arc::new(client))
}

fn index_spec(config: &Config) -> IndexSpec {
    IndexSpec {
        dimension: config.gemini.embedding_dimension as usize,
        similarity: config.store.similarity,
    }
}

/// Build the question answering pipeline from configuration
#[inline]
pub async fn build_service(config: &Config) -> Result<QaService> {
    let store = open_store(config).await?;
    let spec = store.describe().await?.with_context(|| {
        format!(
            "Index {:?} does not exist; run create-index first",
            config.store.index_name
        )
    })?;
    if spec != index_spec(config) {
        anyhow::bail!(
            "Index {:?} has {} dimensions ({}) but configuration expects {} dimensions ({})",
            config.store.index_name,
            spec.dimension,
            spec.similarity,
            config.gemini.embedding_dimension,
            config.store.similarity
        );
    }

    let client = gemini_client(config)?;
    let embedder: Arc<dyn Embedder> = Arc::clone(&client) as Arc<dyn Embedder>;
    let model: Arc<dyn LanguageModel> = client;
    Ok(QaService::from_parts(config, embedder, store, model))
}

/// Provision the configured index; identical existing parameters are left alone
#[inline]
pub async fn create_index(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let spec = index_spec(config);

    match bounded("index creation", config.call_timeout(), store.create_index(&spec)).await? {
        IndexStatus::Created => println!(
            "Created index {:?} ({} dimensions, {})",
            store.index_name(),
            spec.dimension,
            spec.similarity
        ),
        IndexStatus::AlreadyExists => println!(
            "Index {:?} already exists with matching parameters ({} entries)",
            store.index_name(),
            store.count().await?
        ),
    }

    Ok(())
}

/// Chunk, embed and store a document
#[inline]
pub async fn ingest(config: &Config, path: &Path, source: Option<&str>) -> Result<()> {
    info!("Ingesting {}", path.display());

    let store = open_store(config).await?;
    let client = gemini_client(config)?;

    let progress = if console::user_attended_stderr() {
        ProgressBar::new(0).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding chunks {wide_bar}")
                .context("Invalid progress template")?,
        )
    } else {
        ProgressBar::hidden()
    };

    let indexer = Indexer::new(
        client,
        store,
        config.chunking.clone(),
        config.call_timeout(),
    )
    .with_batch_size(config.gemini.batch_size as usize)
    .with_progress(progress);

    let report = indexer
        .ingest_file(path, source)
        .await
        .with_context(|| format!("Failed to ingest {}", path.display()))?;

    println!(
        "Ingested {}: {} pages, {} chunks, {} entries written",
        path.display(),
        report.pages,
        report.chunks,
        report.entries_written
    );
    Ok(())
}

/// Answer one question and print the answer with its sources
#[inline]
pub async fn ask(config: &Config, question: &str) -> Result<()> {
    let service = build_service(config).await?;
    let answer = service.ask(question).await?;

    println!("{}", answer.text);
    if !answer.sources.is_empty() {
        println!();
        println!("{}", console::style("Sources:").bold());
        for source in &answer.sources {
            println!(
                "  {} page {} chunk {} (score {:.3})",
                source.metadata.document.source,
                source.metadata.document.page + 1,
                source.metadata.chunk_index,
                source.score
            );
        }
    }

    Ok(())
}

/// Run the HTTP endpoint until Ctrl-C
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    let service = Arc::new(build_service(config).await?);
    server::run(service, &config.server).await
}

/// Report configuration and vector store state
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("{}", console::style("docs-qa status").bold().cyan());
    println!("{}", "=".repeat(40));

    println!("Vector store: {}", config.store_uri());
    if legacy_store_uri_ignored(&|name: &str| std::env::var(name).ok()) {
        println!(
            "  {} {} is ignored; set {} to choose the store location",
            console::style("Note:").yellow(),
            LEGACY_STORE_URI_ENV,
            STORE_URI_ENV
        );
    }
    match LanceVectorStore::new(config).await {
        Ok(store) => match store.describe().await {
            Ok(Some(spec)) => {
                println!(
                    "  Index {:?}: {} dimensions, {}",
                    store.index_name(),
                    spec.dimension,
                    spec.similarity
                );
                println!("  Entries: {}", store.count().await?);
                if spec != index_spec(config) {
                    println!(
                        "  {} configuration expects {} dimensions ({})",
                        console::style("Mismatch:").red(),
                        config.gemini.embedding_dimension,
                        config.store.similarity
                    );
                }
            }
            Ok(None) => println!(
                "  Index {:?} not created yet; run create-index",
                store.index_name()
            ),
            Err(e) => println!("  {} {}", console::style("Error:").red(), e),
        },
        Err(e) => println!("  {} {}", console::style("Unreachable:").red(), e),
    }

    println!("Gemini: {}", config.gemini.base_url);
    println!(
        "  Models: {} (embedding), {} (chat)",
        config.gemini.embedding_model, config.gemini.chat_model
    );
    if config.gemini.api_key.is_some() {
        println!("  API key: set");
    } else {
        println!(
            "  API key: {} (set {})",
            console::style("missing").red(),
            crate::config::settings::API_KEY_ENV
        );
    }

    Ok(())
}
