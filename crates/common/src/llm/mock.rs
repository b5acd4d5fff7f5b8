//! Scripted chat model for local runs and tests

use super::{ChatMessage, ChatModel, GeneratedMessage, ToolSpec, TokenStream};
use crate::errors::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

type Responder = dyn Fn(&str, &[ChatMessage]) -> GeneratedMessage + Send + Sync;

/// Chat model whose replies are computed by a closure over the system
/// prompt and conversation. Streaming yields the same text split on spaces.
#[derive(Clone)]
pub struct MockChatModel {
    responder: Arc<Responder>,
}

impl MockChatModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &[ChatMessage]) -> GeneratedMessage + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
        }
    }

    /// Always answer with the same text
    pub fn constant(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::new(move |_, _| GeneratedMessage::text(content.clone()))
    }

    fn respond(&self, system: &str, conversation: &[ChatMessage]) -> GeneratedMessage {
        (self.responder)(system, conversation)
    }
}

impl Default for MockChatModel {
    fn default() -> Self {
        Self::new(|_, conversation| {
            let question = conversation
                .iter()
                .rev()
                .find(|m| m.role == super::Role::User)
                .map(|m| m.content.as_str())
                .unwrap_or_default();
            GeneratedMessage::text(format!(
                "No answer could be generated for \"{}\". \
                 [Mock response - LLM API key not configured]",
                question
            ))
        })
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn generate(
        &self,
        system: &str,
        conversation: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<GeneratedMessage> {
        Ok(self.respond(system, conversation))
    }

    async fn stream(&self, system: &str, conversation: &[ChatMessage]) -> Result<TokenStream> {
        let content = self.respond(system, conversation).content;
        let fragments: Vec<Result<String>> = content
            .split_inclusive(' ')
            .map(|fragment| Ok(fragment.to_string()))
            .collect();
        Ok(futures::stream::iter(fragments).boxed())
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}
