// Configuration management module
// TOML settings file plus environment overrides

pub mod settings;


use anyhow::Result;
use console::style;

pub use settings::{
    AnswerConfig, Config, ConfigError, GeminiConfig, RetrievalConfig, ServerConfig, StoreConfig,
    TimeoutConfig,
};

/// Print the effective configuration to stderr
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Gemini:").bold().yellow());
    eprintln!("  API URL: {}", style(&config.gemini.base_url).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.gemini.embedding_model).cyan()
    );
    eprintln!("  Chat Model: {}", style(&config.gemini.chat_model).cyan());
    eprintln!(
        "  Embedding Dimension: {}",
        style(config.gemini.embedding_dimension).cyan()
    );
    eprintln!(
        "  API Key: {}",
        style(masked_api_key(config.gemini.api_key.as_deref())).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!("  URI: {}", style(config.store_uri()).cyan());
    eprintln!("  Index: {}", style(&config.store.index_name).cyan());
    eprintln!("  Similarity: {}", style(config.store.similarity).cyan());

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  Chunking: {} chars, {} overlap",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.overlap).cyan()
    );
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!(
        "  Context Limit: {} tokens ({})",
        style(config.answer.max_context_tokens).cyan(),
        style(config.answer.overflow_policy).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Server:").bold().yellow());
    eprintln!("  Bind: {}", style(&config.server.bind).cyan());
    eprintln!(
        "  Allowed Origin: {}",
        style(&config.server.allowed_origin).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn masked_api_key(key: Option<&str>) -> String {
    match key {
        None => "not set".to_string(),
        Some(key) if key.chars().count() <= 8 => "****".to_string(),
        Some(key) => {
            let tail: String = key.chars().skip(key.chars().count() - 4).collect();
            format!("****{}", tail)
        }
    }
}
