//! Health check handlers

use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub llm: CheckResult,
    pub vector_store: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: ikms_common::VERSION,
    })
}

/// Readiness probe - reports the configured collaborators
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let llm = &state.config.llm;
    let llm_check = if llm.provider != "openai" || llm.api_key.is_some() {
        CheckResult {
            status: "up".to_string(),
            provider: format!("{}:{}", llm.provider, llm.model),
            error: None,
        }
    } else {
        CheckResult {
            status: "down".to_string(),
            provider: llm.provider.clone(),
            error: Some("missing API key".to_string()),
        }
    };

    let vector_check = match &state.config.vector_store.index_url {
        Some(_) => CheckResult {
            status: "up".to_string(),
            provider: "pinecone".to_string(),
            error: None,
        },
        None => CheckResult {
            status: "not_configured".to_string(),
            provider: "static".to_string(),
            error: Some("vector_store.index_url not set, retrieval returns no passages".to_string()),
        },
    };

    let ready = llm_check.status == "up";

    Json(ReadyResponse {
        status: if ready { "ready" } else { "not_ready" }.to_string(),
        checks: HealthChecks {
            llm: llm_check,
            vector_store: vector_check,
        },
    })
}
