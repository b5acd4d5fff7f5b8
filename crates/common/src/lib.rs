//! IKMS Common Library
//!
//! Core of the IKMS question-answering service:
//! - Multi-agent QA pipeline (planning, retrieval, summarization, verification)
//! - Chat-completion client abstraction and tool-calling agents
//! - Retrieval tool over an external vector index
//! - Error types, configuration, and metrics

pub mod agents;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod retrieval;
mod retry;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use services::{QaAnswer, QaService};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
