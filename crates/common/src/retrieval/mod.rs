//! Passage retrieval
//!
//! A `RetrievalTool` answers a search query with passages from the indexed
//! corpus. `RetrievalToolAdapter` exposes it to tool-calling agents as
//! `retrieval_tool`, whose output is the serialized passage list.

mod vector_store;

pub use vector_store::VectorStoreRetriever;

use crate::config::AppConfig;
use crate::embeddings::create_embedder;
use crate::errors::{AppError, Result};
use crate::llm::{Tool, ToolSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Arc;

/// Name under which the retrieval tool is advertised to the model
pub const RETRIEVAL_TOOL_NAME: &str = "retrieval_tool";

/// A retrieved chunk of the corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    /// Source page, when the index carries it
    pub page: Option<u32>,
}

impl Passage {
    pub fn new(text: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            text: text.into(),
            page,
        }
    }
}

/// Search over the indexed corpus
#[async_trait]
pub trait RetrievalTool: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Passage>>;
}

/// Render passages as numbered `Chunk N (page=P):` blocks
pub fn serialize_passages(passages: &[Passage]) -> String {
    let mut out = String::new();
    for (i, passage) in passages.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let _ = match passage.page {
            Some(page) => write!(out, "Chunk {} (page={}):\n{}", i + 1, page, passage.text),
            None => write!(out, "Chunk {} (page=unknown):\n{}", i + 1, passage.text),
        };
    }
    out
}

#[derive(Deserialize)]
struct RetrievalArgs {
    query: String,
}

/// Exposes a `RetrievalTool` as a model-callable tool
pub struct RetrievalToolAdapter {
    retriever: Arc<dyn RetrievalTool>,
}

impl RetrievalToolAdapter {
    pub fn new(retriever: Arc<dyn RetrievalTool>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for RetrievalToolAdapter {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: RETRIEVAL_TOOL_NAME.to_string(),
            description: "Search the indexed documents for passages relevant to a query. \
                          Returns numbered chunks with page references."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query optimized for semantic similarity"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, arguments: &str) -> Result<String> {
        let args: RetrievalArgs =
            serde_json::from_str(arguments).map_err(|e| AppError::GenerationError {
                message: format!("Invalid {} arguments: {}", RETRIEVAL_TOOL_NAME, e),
            })?;

        let passages = self.retriever.search(&args.query).await?;
        tracing::debug!(query = %args.query, passages = passages.len(), "Retrieved passages");

        Ok(serialize_passages(&passages))
    }
}

/// Retriever that answers every query with a fixed passage list
#[derive(Debug, Clone, Default)]
pub struct StaticRetrievalTool {
    passages: Vec<Passage>,
}

impl StaticRetrievalTool {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self { passages }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetrievalTool for StaticRetrievalTool {
    async fn search(&self, _query: &str) -> Result<Vec<Passage>> {
        Ok(self.passages.clone())
    }
}

/// Create the retriever described by configuration
pub fn create_retrieval_tool(config: &AppConfig) -> Result<Arc<dyn RetrievalTool>> {
    match config.vector_store.index_url.as_deref() {
        Some(index_url) => {
            let embedder = create_embedder(&config.embedding)?;
            let retriever = VectorStoreRetriever::new(index_url, embedder, &config.vector_store)?;
            Ok(Arc::new(retriever))
        }
        None => {
            tracing::warn!("vector_store.index_url not set, retrieval will return no passages");
            Ok(Arc::new(StaticRetrievalTool::empty()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_passages() {
        let passages = vec![
            Passage::new("HNSW builds a layered proximity graph.", Some(2)),
            Passage::new("Search starts at the top layer.", None),
        ];

        assert_eq!(
            serialize_passages(&passages),
            "Chunk 1 (page=2):\nHNSW builds a layered proximity graph.\n\n\
             Chunk 2 (page=unknown):\nSearch starts at the top layer."
        );
        assert_eq!(serialize_passages(&[]), "");
    }

    #[tokio::test]
    async fn test_adapter_serializes_search_results() {
        let retriever = StaticRetrievalTool::new(vec![Passage::new("Same chunk.", Some(1))]);
        let tool = RetrievalToolAdapter::new(Arc::new(retriever));

        assert_eq!(tool.spec().name, "retrieval_tool");
        let output = tool.call(r#"{"query":"anything"}"#).await.unwrap();
        assert_eq!(output, "Chunk 1 (page=1):\nSame chunk.");
    }

    #[tokio::test]
    async fn test_adapter_rejects_malformed_arguments() {
        let tool = RetrievalToolAdapter::new(Arc::new(StaticRetrievalTool::empty()));
        let result = tool.call("not json").await;
        assert!(matches!(result, Err(AppError::GenerationError { .. })));
    }

    #[test]
    fn test_missing_index_falls_back_to_empty() {
        let config = AppConfig::default();
        assert!(create_retrieval_tool(&config).is_ok());
    }
}
