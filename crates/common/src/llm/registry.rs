//! Chat model registry
//!
//! Every chat client the pipeline needs is constructed once at startup, one
//! per distinct model parameter set, and shared read-only afterwards.

use super::{ChatModel, MockChatModel, OpenAiChatModel};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Pipeline stage a model is resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Planning,
    Retrieval,
    Summarization,
    Verification,
}

impl AgentRole {
    pub const ALL: [AgentRole; 4] = [
        AgentRole::Planning,
        AgentRole::Retrieval,
        AgentRole::Summarization,
        AgentRole::Verification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Planning => "planning",
            AgentRole::Retrieval => "retrieval",
            AgentRole::Summarization => "summarization",
            AgentRole::Verification => "verification",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters that distinguish one constructed chat client from another.
///
/// Temperature is stored in thousandths so the key can be hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    model: String,
    temperature_milli: i32,
}

impl ModelKey {
    pub fn new(model: &str, temperature: f32) -> Self {
        Self {
            model: model.to_string(),
            temperature_milli: (temperature * 1000.0).round() as i32,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature_milli as f32 / 1000.0
    }
}

/// Construct a chat client for one parameter set
pub fn create_chat_model(config: &LlmConfig, key: &ModelKey) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "llm.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAiChatModel::new(api_key, config, key)?))
        }
        "mock" => Ok(Arc::new(MockChatModel::default())),
        other => {
            tracing::warn!(provider = other, "Unknown LLM provider, using mock");
            Ok(Arc::new(MockChatModel::default()))
        }
    }
}

/// Immutable map from agent role to its shared chat client
pub struct ModelRegistry {
    models: HashMap<ModelKey, Arc<dyn ChatModel>>,
    roles: HashMap<AgentRole, ModelKey>,
}

impl ModelRegistry {
    /// Build one client per distinct key among the four roles
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut models: HashMap<ModelKey, Arc<dyn ChatModel>> = HashMap::new();
        let mut roles = HashMap::new();

        for role in AgentRole::ALL {
            let key = ModelKey::new(&config.model, config.temperature_for(role));
            if !models.contains_key(&key) {
                let model = create_chat_model(config, &key)?;
                tracing::debug!(
                    role = %role,
                    model = key.model(),
                    temperature = key.temperature(),
                    "Constructed chat model"
                );
                models.insert(key.clone(), model);
            }
            roles.insert(role, key);
        }

        tracing::info!(
            provider = %config.provider,
            clients = models.len(),
            "Model registry ready"
        );

        Ok(Self { models, roles })
    }

    /// Registry that serves the same client to every role
    pub fn with_model(model: Arc<dyn ChatModel>) -> Self {
        let key = ModelKey::new(model.model_name(), 0.0);
        let roles = AgentRole::ALL.into_iter().map(|r| (r, key.clone())).collect();
        let mut models = HashMap::new();
        models.insert(key, model);
        Self { models, roles }
    }

    pub fn for_role(&self, role: AgentRole) -> Result<Arc<dyn ChatModel>> {
        self.roles
            .get(&role)
            .and_then(|key| self.models.get(key))
            .cloned()
            .ok_or_else(|| AppError::Internal {
                message: format!("No chat model registered for the {} agent", role),
            })
    }

    /// Number of distinct clients constructed
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
