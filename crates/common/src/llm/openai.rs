//! OpenAI-compatible chat-completion client
//!
//! Talks to `{api_base}/chat/completions`, both plain and with
//! `stream: true` (Server-Sent Events terminated by `data: [DONE]`).

use super::{ChatMessage, ChatModel, GeneratedMessage, ModelKey, Role, TokenStream, ToolCall, ToolSpec};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::retry::{with_retry, Failure};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Instant;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSpec,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(msg: &'a ChatMessage) -> Self {
        let content = if msg.content.is_empty() && !msg.tool_calls.is_empty() {
            None
        } else {
            Some(msg.content.as_str())
        };

        Self {
            role: msg.role,
            content,
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: &call.id,
                    kind: "function",
                    function: WireFunction {
                        name: &call.name,
                        arguments: &call.arguments,
                    },
                })
                .collect(),
            tool_call_id: msg.tool_call_id.as_deref(),
        }
    }
}

/// OpenAI chat-completion client
pub struct OpenAiChatModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    base_url: String,
    max_retries: u32,
}

impl OpenAiChatModel {
    /// Create a client for the model parameters in `key`
    pub fn new(api_key: String, config: &LlmConfig, key: &ModelKey) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: key.model().to_string(),
            temperature: key.temperature(),
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_request<'a>(
        &'a self,
        system: &'a str,
        conversation: &'a [ChatMessage],
        tools: &'a [ToolSpec],
        stream: bool,
    ) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(WireMessage {
            role: Role::System,
            content: Some(system),
            tool_calls: Vec::new(),
            tool_call_id: None,
        });
        messages.extend(conversation.iter().map(WireMessage::from));

        ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream,
            tools: tools
                .iter()
                .map(|function| WireTool {
                    kind: "function",
                    function,
                })
                .collect(),
        }
    }

    async fn send(&self, request: &ChatRequest<'_>) -> std::result::Result<reqwest::Response, Failure> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let err = AppError::GenerationError {
                    message: format!("LLM API request failed: {}", e),
                };
                Failure::from_transport(&e, err)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let err = AppError::GenerationError {
                message: format!("LLM API error {}: {}", status, body),
            };
            return Err(Failure::from_status(status, err));
        }

        Ok(response)
    }

    async fn complete_once(
        &self,
        request: &ChatRequest<'_>,
    ) -> std::result::Result<GeneratedMessage, Failure> {
        let response = self.send(request).await?;

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            Failure::Permanent(AppError::GenerationError {
                message: format!("Failed to parse LLM response: {}", e),
            })
        })?;

        let message = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| {
                Failure::Permanent(AppError::GenerationError {
                    message: "Empty response from LLM".to_string(),
                })
            })?;

        Ok(GeneratedMessage {
            content: message.content.unwrap_or_default(),
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn generate(
        &self,
        system: &str,
        conversation: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<GeneratedMessage> {
        let start = Instant::now();
        let request = self.build_request(system, conversation, tools, false);

        let result = with_retry("chat_completion", self.max_retries, || {
            self.complete_once(&request)
        })
        .await;

        crate::metrics::record_llm(start.elapsed().as_secs_f64(), &self.model, result.is_ok());
        result
    }

    async fn stream(&self, system: &str, conversation: &[ChatMessage]) -> Result<TokenStream> {
        let start = Instant::now();
        let request = self.build_request(system, conversation, &[], true);

        // Streams are not retried: fragments may already have reached the caller
        let response = match self.send(&request).await {
            Ok(response) => response,
            Err(Failure::Transient(err)) | Err(Failure::Permanent(err)) => {
                crate::metrics::record_llm(start.elapsed().as_secs_f64(), &self.model, false);
                return Err(err);
            }
        };
        crate::metrics::record_llm(start.elapsed().as_secs_f64(), &self.model, true);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();

        let state = StreamState {
            body,
            decoder: SseDecoder::new(),
            exhausted: false,
        };

        Ok(futures::stream::try_unfold(state, next_fragment).boxed())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    exhausted: bool,
}

async fn next_fragment(mut state: StreamState) -> Result<Option<(String, StreamState)>> {
    loop {
        match state.decoder.next_event()? {
            Some(SseEvent::Delta(text)) => return Ok(Some((text, state))),
            Some(SseEvent::Done) => return Ok(None),
            None if state.exhausted => return Ok(None),
            None => match state.body.next().await {
                Some(chunk) => {
                    let chunk = chunk.map_err(|e| AppError::GenerationError {
                        message: format!("LLM stream interrupted: {}", e),
                    })?;
                    state.decoder.push(&chunk);
                }
                None => {
                    state.exhausted = true;
                    state.decoder.finish();
                }
            },
        }
    }
}

/// Decoded Server-Sent Event from a streamed completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A non-empty content fragment
    Delta(String),
    /// End-of-stream marker
    Done,
}

/// Incremental line decoder for `text/event-stream` completion bodies.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw body bytes
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Flush a trailing line without a newline at end of body
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() && self.buffer.last() != Some(&b'\n') {
            self.buffer.push(b'\n');
        }
    }

    /// Next complete event, or `None` when more bytes are needed
    pub fn next_event(&mut self) -> Result<Option<SseEvent>> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();

            let Some(payload) = line.strip_prefix("data:") else {
                // Blank separators, comments, `event:` and `id:` fields
                continue;
            };
            let payload = payload.trim();

            if payload == "[DONE]" {
                return Ok(Some(SseEvent::Done));
            }

            let chunk: StreamChunk =
                serde_json::from_str(payload).map_err(|e| AppError::GenerationError {
                    message: format!("Malformed stream chunk: {}", e),
                })?;

            if let Some(error) = chunk.error {
                return Err(AppError::GenerationError {
                    message: format!("LLM stream error: {}", error),
                });
            }

            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .unwrap_or_default();

            if !content.is_empty() {
                return Ok(Some(SseEvent::Delta(content)));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> OpenAiChatModel {
        let config = LlmConfig::default();
        let key = ModelKey::new(&config.model, 0.0);
        OpenAiChatModel::new("sk-test".to_string(), &config, &key).unwrap()
    }

    #[test]
    fn test_request_shape() {
        let model = model();
        let conversation = vec![
            ChatMessage::user("What is HNSW?"),
            ChatMessage::tool_request(vec![ToolCall {
                id: "call_1".into(),
                name: "retrieval_tool".into(),
                arguments: r#"{"query":"HNSW"}"#.into(),
            }]),
            ChatMessage::tool("call_1", "Chunk 1 (page=3):\nHNSW is a graph-based index."),
        ];
        let tools = vec![ToolSpec {
            name: "retrieval_tool".into(),
            description: "search".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];

        let request = model.build_request("sys", &conversation, &tools, false);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4o-mini");
        assert!(json.get("stream").is_none());
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "What is HNSW?");
        assert!(json["messages"][2].get("content").is_none());
        assert_eq!(json["messages"][2]["tool_calls"][0]["type"], "function");
        assert_eq!(json["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(json["tools"][0]["function"]["name"], "retrieval_tool");
    }

    #[test]
    fn test_decoder_yields_deltas_in_order() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n");
        decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"HNSW \"}}]}\n\n");
        decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"is\"}}]}\n\ndata: [DONE]\n\n");

        assert_eq!(decoder.next_event().unwrap(), Some(SseEvent::Delta("HNSW ".into())));
        assert_eq!(decoder.next_event().unwrap(), Some(SseEvent::Delta("is".into())));
        assert_eq!(decoder.next_event().unwrap(), Some(SseEvent::Done));
        assert_eq!(decoder.next_event().unwrap(), None);
    }

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::new();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"größe\"}}]}\n".as_bytes();
        let (head, tail) = line.split_at(42);

        decoder.push(head);
        assert_eq!(decoder.next_event().unwrap(), None);
        decoder.push(tail);
        assert_eq!(decoder.next_event().unwrap(), Some(SseEvent::Delta("größe".into())));
    }

    #[test]
    fn test_decoder_flushes_trailing_line() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: [DONE]");
        assert_eq!(decoder.next_event().unwrap(), None);
        decoder.finish();
        assert_eq!(decoder.next_event().unwrap(), Some(SseEvent::Done));
    }

    #[test]
    fn test_decoder_surfaces_stream_errors() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: {\"error\":{\"message\":\"quota\"}}\n");
        assert!(matches!(
            decoder.next_event(),
            Err(AppError::GenerationError { .. })
        ));

        let mut decoder = SseDecoder::new();
        decoder.push(b"data: not json\n");
        assert!(decoder.next_event().is_err());
    }
}
