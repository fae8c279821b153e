use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Chat with a document.
///
/// Load a PDF or text file once, then ask questions about it. Answers are
/// generated by a local Ollama model from the passages most similar to each
/// question. Without a subcommand an interactive menu is shown.
#[derive(Parser, Debug)]
#[command(name = "docchat", version, about = "Chat with a document")]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Log filter (e.g. `debug`, `docchat_rag=trace`); overrides RUST_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ingest a document into its own collection
    Load {
        /// Document to load (.pdf, .txt or .md)
        file: PathBuf,

        /// Start chatting with the document once it is loaded
        #[arg(long)]
        chat: bool,
    },
    /// Ask questions about a previously loaded document
    Chat,
    /// List stored collections with their chunk counts
    Collections,
    /// Remove every chunk from a collection but keep the collection
    Reset {
        /// Collection name (e.g. `pdf_rapor`)
        name: String,
    },
    /// Delete a collection
    Delete {
        /// Collection name (e.g. `pdf_rapor`)
        name: String,
    },
}
