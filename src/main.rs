use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docrag::Result;
use docrag::commands::{
    ingest_file, init_config, query_documents, reset_store, show_config, show_status,
};
use docrag::config::Config;
use docrag::rag::DEFAULT_TOP_K;

#[derive(Parser)]
#[command(name = "docrag")]
#[command(about = "Retrieval-augmented question answering over PDF documents")]
#[command(version)]
struct Cli {
    /// Override the data directory holding config and the vector store
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write or display the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest a PDF document into the vector store
    Ingest {
        /// Path to the PDF file
        file: PathBuf,
        /// Optional display name for the document
        #[arg(long)]
        name: Option<String>,
    },
    /// Ask a question over the ingested documents
    Query {
        /// The question to answer
        query: String,
        /// Number of chunks to retrieve
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Show index and service status
    Status,
    /// Delete every record from the vector store
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let base_dir = match cli.data_dir {
        Some(dir) => dir,
        None => Config::default_base_dir()?,
    };
    let config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                init_config(&config)?;
            }
        }
        Commands::Ingest { file, name } => {
            ingest_file(&config, &file, name).await?;
        }
        Commands::Query { query, top_k } => {
            query_documents(&config, &query, top_k).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Reset => {
            reset_store(&config).await?;
        }
    }

    Ok(())
}
