//! Chat-completion client abstraction
//!
//! Provides:
//! - Message and tool-call types shared by every agent
//! - The `ChatModel` trait (blocking and streamed generation)
//! - OpenAI-compatible and mock implementations
//! - A registry of constructed models keyed by model parameters
//! - Tool-calling agents built on top of a `ChatModel`

mod agent;
mod mock;
mod openai;
mod registry;

pub use agent::{last_assistant_content, last_tool_content, Agent, ScriptedAgent, ToolCallingAgent};
pub use mock::MockChatModel;
pub use openai::{OpenAiChatModel, SseDecoder, SseEvent};
pub use registry::{create_chat_model, AgentRole, ModelKey, ModelRegistry};

use crate::errors::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Incremental generation output, in generation order
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments as produced by the model
    pub arguments: String,
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Set on assistant messages that request tools
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool messages, pointing back at the request
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    /// Assistant turn that only requests tool calls
    pub fn tool_request(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, "")
        }
    }
}

/// A model response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedMessage {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl GeneratedMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn into_message(self) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: self.content,
            tool_calls: self.tool_calls,
            tool_call_id: None,
        }
    }
}

/// Tool description advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

/// A function the model may call
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    /// Execute with the model-supplied JSON arguments
    async fn call(&self, arguments: &str) -> Result<String>;
}

/// Chat-completion backend
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a single response. With a non-empty `tools` list the model
    /// may answer with tool calls instead of text.
    async fn generate(
        &self,
        system: &str,
        conversation: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<GeneratedMessage>;

    /// Generate a response as a stream of text fragments
    async fn stream(&self, system: &str, conversation: &[ChatMessage]) -> Result<TokenStream>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = ChatMessage::tool("call_1", "Chunk 1 (page=2):\ntext");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));

        let request = ChatMessage::tool_request(vec![ToolCall {
            id: "call_1".into(),
            name: "retrieval_tool".into(),
            arguments: r#"{"query":"HNSW"}"#.into(),
        }]);
        assert_eq!(request.role, Role::Assistant);
        assert!(request.content.is_empty());
        assert_eq!(request.tool_calls.len(), 1);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}
