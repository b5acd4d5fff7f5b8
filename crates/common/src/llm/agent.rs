//! Tool-calling agents
//!
//! An agent turns one user input into a transcript: the input message, any
//! tool requests and tool results, and the final assistant reply.

use super::{ChatMessage, ChatModel, Role, Tool, ToolSpec};
use crate::errors::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Something that answers a single input with a message transcript
#[async_trait]
pub trait Agent: Send + Sync {
    /// Run the agent on `input`. The returned transcript starts with the
    /// user message and never contains the system prompt.
    async fn invoke(&self, input: &str) -> Result<Vec<ChatMessage>>;
}

/// Agent backed by a chat model that may call tools before answering
pub struct ToolCallingAgent {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
    tools: Vec<Arc<dyn Tool>>,
    max_tool_rounds: usize,
}

impl ToolCallingAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        system_prompt: impl Into<String>,
        tools: Vec<Arc<dyn Tool>>,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
            tools,
            max_tool_rounds,
        }
    }

    fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.spec().name == name)
    }
}

#[async_trait]
impl Agent for ToolCallingAgent {
    async fn invoke(&self, input: &str) -> Result<Vec<ChatMessage>> {
        let specs: Vec<ToolSpec> = self.tools.iter().map(|tool| tool.spec()).collect();
        let mut transcript = vec![ChatMessage::user(input)];
        let mut rounds = 0usize;

        loop {
            let reply = self
                .model
                .generate(&self.system_prompt, &transcript, &specs)
                .await?;

            if reply.tool_calls.is_empty() {
                transcript.push(reply.into_message());
                return Ok(transcript);
            }

            let calls = reply.tool_calls.clone();
            transcript.push(reply.into_message());

            for call in calls {
                let output = match self.find_tool(&call.name) {
                    Some(tool) => {
                        tracing::debug!(tool = %call.name, arguments = %call.arguments, "Calling tool");
                        tool.call(&call.arguments).await?
                    }
                    None => {
                        tracing::warn!(tool = %call.name, "Model requested an unknown tool");
                        format!("Error: unknown tool '{}'", call.name)
                    }
                };
                transcript.push(ChatMessage::tool(call.id, output));
            }

            rounds += 1;
            if rounds >= self.max_tool_rounds {
                tracing::warn!(
                    rounds = rounds,
                    model = self.model.model_name(),
                    "Tool round limit reached, returning partial transcript"
                );
                return Ok(transcript);
            }
        }
    }
}

type ScriptFn = dyn Fn(&str) -> Result<Vec<ChatMessage>> + Send + Sync;

/// Agent whose transcript is produced by a closure
#[derive(Clone)]
pub struct ScriptedAgent {
    script: Arc<ScriptFn>,
}

impl ScriptedAgent {
    pub fn from_fn<F>(script: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<ChatMessage>> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
        }
    }

    /// Always reply with the same assistant text
    pub fn replying(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::from_fn(move |input| {
            Ok(vec![
                ChatMessage::user(input),
                ChatMessage::assistant(content.clone()),
            ])
        })
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn invoke(&self, input: &str) -> Result<Vec<ChatMessage>> {
        (self.script)(input)
    }
}

/// Content of the final assistant message, or `""` when there is none
pub fn last_assistant_content(transcript: &[ChatMessage]) -> String {
    transcript
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// Content of the most recent tool result
pub fn last_tool_content(transcript: &[ChatMessage]) -> Option<&str> {
    transcript
        .iter()
        .rev()
        .find(|m| m.role == Role::Tool)
        .map(|m| m.content.as_str())
}
