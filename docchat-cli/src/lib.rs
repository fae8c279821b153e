//! The `docchat` command-line chatbot.
//!
//! Loads a document into its own collection of the file-backed index, then
//! answers questions about it with a local Ollama model. Configuration comes
//! from a YAML file with environment overrides; see [`AppConfig`].

pub mod app;
pub mod chat;
pub mod cli;
pub mod config;
pub mod telemetry;

pub use app::{App, CollectionChoice, choose_collection, embedding_provider, parse_selection};
pub use chat::{ChatInput, classify_input, format_source};
pub use cli::{Cli, Command};
pub use config::AppConfig;
