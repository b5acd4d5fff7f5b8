//! Pinecone-compatible vector index client

use super::{Passage, RetrievalTool};
use crate::config::VectorStoreConfig;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::retry::{with_retry, Failure};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    #[serde(default)]
    metadata: Option<MatchMetadata>,
}

#[derive(Debug, Deserialize)]
struct MatchMetadata {
    text: Option<String>,
    page: Option<f64>,
}

/// Embeds the query and returns the nearest passages from the index
pub struct VectorStoreRetriever {
    client: reqwest::Client,
    index_url: String,
    api_key: Option<String>,
    namespace: Option<String>,
    top_k: usize,
    max_retries: u32,
    embedder: Arc<dyn Embedder>,
}

impl VectorStoreRetriever {
    pub fn new(
        index_url: &str,
        embedder: Arc<dyn Embedder>,
        config: &VectorStoreConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            index_url: index_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            namespace: config.namespace.clone(),
            top_k: config.top_k,
            max_retries: config.max_retries,
            embedder,
        })
    }

    async fn query_once(&self, vector: &[f32]) -> std::result::Result<Vec<Passage>, Failure> {
        let request = QueryRequest {
            vector,
            top_k: self.top_k,
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };

        let mut builder = self
            .client
            .post(format!("{}/query", self.index_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Api-Key", key);
        }

        let response = builder.send().await.map_err(|e| {
            let err = AppError::RetrievalError {
                message: format!("Vector index request failed: {}", e),
            };
            Failure::from_transport(&e, err)
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let err = AppError::RetrievalError {
                message: format!("Vector index error {}: {}", status, body),
            };
            return Err(Failure::from_status(status, err));
        }

        let result: QueryResponse = response.json().await.map_err(|e| {
            Failure::Permanent(AppError::RetrievalError {
                message: format!("Failed to parse vector index response: {}", e),
            })
        })?;

        Ok(passages_from_matches(result.matches))
    }
}

/// Keep matches that carry text, in rank order
fn passages_from_matches(matches: Vec<QueryMatch>) -> Vec<Passage> {
    matches
        .into_iter()
        .filter_map(|m| m.metadata)
        .filter_map(|meta| {
            let text = meta.text?;
            let page = meta.page.filter(|p| *p >= 0.0).map(|p| p as u32);
            Some(Passage { text, page })
        })
        .collect()
}

#[async_trait]
impl RetrievalTool for VectorStoreRetriever {
    async fn search(&self, query: &str) -> Result<Vec<Passage>> {
        let vector = self.embedder.embed(query).await?;

        let start = Instant::now();
        let result = with_retry("vector_query", self.max_retries, || self.query_once(&vector)).await;
        crate::metrics::record_vector_query(start.elapsed().as_secs_f64(), result.is_ok());

        result
    }
}
