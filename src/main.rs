use anyhow::Result;
use clap::{Parser, Subcommand};
use docs_qa::commands::{ask, create_index, ingest, serve, show_status};
use docs_qa::config::{Config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docs-qa")]
#[command(about = "Question answering over PDF documents with Gemini and LanceDB")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Create the vector index if it does not exist
    CreateIndex,
    /// Chunk, embed and store a PDF or text document
    Ingest {
        /// Path to the document
        file: PathBuf,
        /// Source name stored with each chunk, defaults to the file name
        #[arg(long)]
        source: Option<String>,
    },
    /// Answer a single question from the command line
    Ask {
        /// The question to answer
        question: String,
    },
    /// Serve the question endpoint over HTTP
    Serve {
        /// Address to bind, overriding the configured one
        #[arg(long)]
        bind: Option<String>,
    },
    /// Show vector store and API status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_from_env()?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                config.save()?;
                println!("Configuration written to {}", config.config_file_path().display());
            }
        }
        Commands::CreateIndex => {
            create_index(&config).await?;
        }
        Commands::Ingest { file, source } => {
            ingest(&config, &file, source.as_deref()).await?;
        }
        Commands::Ask { question } => {
            ask(&config, &question).await?;
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
                config.server.validate()?;
            }
            serve(&config).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
    }

    Ok(())
}
