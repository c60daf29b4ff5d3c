//! Gaia node client (OpenAI-compatible /v1 endpoint).
//! Supports non-streaming and streaming chat (SSE), with tool calling.

use crate::llm::{ChatMessage, ChatResponse, ToolCall, ToolCallFunction, ToolDefinition};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://llamatool.us.gaianet.network/v1";

/// Client for a hosted Gaia node's OpenAI-compatible chat API.
#[derive(Clone)]
pub struct GaiaClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum GaiaError {
    #[error("gaia request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gaia api error: {0}")]
    Api(String),
}

impl GaiaClient {
    pub fn new(base_url: Option<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// POST /chat/completions — non-streaming chat. Optionally pass tools for function calling.
    pub async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse, GaiaError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = OpenAiChatRequest {
            model: model.to_string(),
            messages: messages_to_openai(&messages),
            stream: false,
            tools,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(GaiaError::Api(format!("{} {}", status, body)));
        }
        let data: OpenAiChatResponse = res.json().await?;
        Ok(openai_response_to_chat_response(data))
    }

    /// POST /chat/completions with stream: true. Parses SSE frames and calls on_chunk for each
    /// content delta; returns the accumulated message. Tool calls are assembled incrementally by index.
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<ChatResponse, GaiaError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = OpenAiChatRequest {
            model: model.to_string(),
            messages: messages_to_openai(&messages),
            stream: true,
            tools,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(GaiaError::Api(format!("{} {}", status, body)));
        }
        let mut stream = res.bytes_stream();
        let mut buffer = Vec::new();
        let mut content = String::new();
        let mut tool_calls: Vec<StreamToolCall> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(GaiaError::Request)?;
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.windows(2).position(|w| w == b"\n\n") {
                let frame_bytes: Vec<u8> = buffer.drain(..pos).collect();
                buffer.drain(..2);
                let frame = String::from_utf8_lossy(&frame_bytes);
                let frame = frame.trim();
                if let Some(data) = frame.strip_prefix("data: ") {
                    if data == "[DONE]" {
                        break;
                    }
                    if let Ok(ev) = serde_json::from_str::<OpenAiStreamChunk>(data) {
                        if let Some(choice) = ev.choices.and_then(|c| c.into_iter().next()) {
                            if let Some(delta) = choice.delta {
                                if let Some(c) = delta.content {
                                    on_chunk(&c);
                                    content.push_str(&c);
                                }
                                if let Some(tc_list) = delta.tool_calls {
                                    accumulate_stream_tool_calls(&mut tool_calls, tc_list);
                                }
                            }
                        }
                    }
                }
            }
        }

        let tool_calls_parsed: Option<Vec<ToolCall>> = if tool_calls.is_empty() {
            None
        } else {
            Some(
                tool_calls
                    .into_iter()
                    .map(|tc| ToolCall {
                        typ: tc.typ,
                        function: ToolCallFunction {
                            name: tc.name,
                            arguments: serde_json::from_str(&tc.arguments)
                                .unwrap_or(serde_json::Value::Null),
                        },
                    })
                    .collect(),
            )
        };

        Ok(ChatResponse {
            message: Some(ChatMessage {
                role: "assistant".to_string(),
                content,
                tool_calls: tool_calls_parsed,
                tool_name: None,
            }),
            done: true,
        })
    }
}

/// Merge one streamed tool-call delta batch into the accumulator, keyed by index.
fn accumulate_stream_tool_calls(acc: &mut Vec<StreamToolCall>, deltas: Vec<StreamDeltaToolCall>) {
    for tc in deltas {
        let Some(idx) = tc.index else { continue };
        while acc.len() <= idx as usize {
            acc.push(StreamToolCall::default());
        }
        let slot = &mut acc[idx as usize];
        if let Some(typ) = tc.typ {
            slot.typ = typ;
        }
        if let Some(f) = tc.function {
            if let Some(n) = f.name {
                slot.name = n;
            }
            if let Some(a) = f.arguments {
                slot.arguments.push_str(&a);
            }
        }
    }
}

// --- OpenAI wire types ---

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinition>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
enum OpenAiMessage {
    System { content: String },
    User { content: String },
    Assistant {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<OpenAiToolCallRef>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct OpenAiToolCallRef {
    id: String,
    #[serde(rename = "type")]
    typ: String,
    function: OpenAiToolCallFunctionRef,
}

#[derive(Debug, Serialize)]
struct OpenAiToolCallFunctionRef {
    name: String,
    arguments: String,
}

/// Convert internal messages to OpenAI format. Assigns tool_call_id per assistant tool_calls and
/// matches following tool messages by order.
fn messages_to_openai(messages: &[ChatMessage]) -> Vec<OpenAiMessage> {
    let mut out = Vec::with_capacity(messages.len());
    let mut pending_ids: Vec<String> = Vec::new();
    let mut next_id = 0;

    for m in messages {
        match m.role.as_str() {
            "system" => out.push(OpenAiMessage::System {
                content: m.content.clone(),
            }),
            "assistant" => {
                let tool_calls = m.tool_calls.as_ref().map(|tcs| {
                    pending_ids.clear();
                    tcs.iter()
                        .map(|tc| {
                            let tid = format!("call_{}", next_id);
                            next_id += 1;
                            pending_ids.push(tid.clone());
                            OpenAiToolCallRef {
                                id: tid,
                                typ: if tc.typ.is_empty() {
                                    "function".to_string()
                                } else {
                                    tc.typ.clone()
                                },
                                function: OpenAiToolCallFunctionRef {
                                    name: tc.function.name.clone(),
                                    arguments: serde_json::to_string(&tc.function.arguments)
                                        .unwrap_or_else(|_| "{}".to_string()),
                                },
                            }
                        })
                        .collect()
                });
                out.push(OpenAiMessage::Assistant {
                    content: m.content.clone(),
                    tool_calls,
                });
            }
            "tool" => {
                let id = if pending_ids.is_empty() {
                    let fallback = format!("call_{}", next_id);
                    next_id += 1;
                    fallback
                } else {
                    pending_ids.remove(0)
                };
                out.push(OpenAiMessage::Tool {
                    tool_call_id: id,
                    content: m.content.clone(),
                });
            }
            _ => {
                out.push(OpenAiMessage::User {
                    content: m.content.clone(),
                });
                pending_ids.clear();
            }
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Option<Vec<OpenAiChoice>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseToolCall {
    #[serde(rename = "type")]
    typ: Option<String>,
    function: Option<OpenAiResponseToolCallFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseToolCallFunction {
    name: Option<String>,
    arguments: Option<String>,
}

fn openai_response_to_chat_response(data: OpenAiChatResponse) -> ChatResponse {
    let message = data
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message);
    let (content, tool_calls) = match message {
        Some(m) => {
            let tool_calls = m.tool_calls.map(|tcs| {
                tcs.into_iter()
                    .filter_map(|tc| {
                        let f = tc.function?;
                        let name = f.name?;
                        Some(ToolCall {
                            typ: tc.typ.unwrap_or_else(|| "function".to_string()),
                            function: ToolCallFunction {
                                name,
                                arguments: f
                                    .arguments
                                    .as_deref()
                                    .and_then(|s| serde_json::from_str(s).ok())
                                    .unwrap_or(serde_json::Value::Null),
                            },
                        })
                    })
                    .collect()
            });
            (m.content.unwrap_or_default(), tool_calls)
        }
        None => (String::new(), None),
    };
    ChatResponse {
        message: Some(ChatMessage {
            role: "assistant".to_string(),
            content,
            tool_calls,
            tool_name: None,
        }),
        done: true,
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    choices: Option<Vec<OpenAiStreamChoice>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: Option<OpenAiStreamDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamDeltaToolCall {
    index: Option<u32>,
    #[serde(rename = "type")]
    typ: Option<String>,
    function: Option<StreamDeltaToolCallFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamDeltaToolCallFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct StreamToolCall {
    typ: String,
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_to_openai_assigns_tool_call_ids_in_order() {
        let messages = vec![
            ChatMessage::user("check my balance"),
            ChatMessage {
                role: "assistant".to_string(),
                content: String::new(),
                tool_calls: Some(vec![ToolCall {
                    typ: "function".to_string(),
                    function: ToolCallFunction {
                        name: "wallet_balance".to_string(),
                        arguments: serde_json::json!({}),
                    },
                }]),
                tool_name: None,
            },
            ChatMessage {
                role: "tool".to_string(),
                content: "0.5 ETH".to_string(),
                tool_calls: None,
                tool_name: Some("wallet_balance".to_string()),
            },
        ];
        let out = messages_to_openai(&messages);
        assert_eq!(out.len(), 3);
        let assistant_id = match &out[1] {
            OpenAiMessage::Assistant { tool_calls, .. } => {
                tool_calls.as_ref().unwrap()[0].id.clone()
            }
            other => panic!("expected assistant, got {:?}", other),
        };
        match &out[2] {
            OpenAiMessage::Tool { tool_call_id, .. } => assert_eq!(tool_call_id, &assistant_id),
            other => panic!("expected tool, got {:?}", other),
        }
    }

    #[test]
    fn accumulates_streamed_tool_call_fragments_by_index() {
        let mut acc = Vec::new();
        accumulate_stream_tool_calls(
            &mut acc,
            vec![StreamDeltaToolCall {
                index: Some(0),
                typ: Some("function".to_string()),
                function: Some(StreamDeltaToolCallFunction {
                    name: Some("wallet_address".to_string()),
                    arguments: Some("{\"unit\":".to_string()),
                }),
            }],
        );
        accumulate_stream_tool_calls(
            &mut acc,
            vec![StreamDeltaToolCall {
                index: Some(0),
                typ: None,
                function: Some(StreamDeltaToolCallFunction {
                    name: None,
                    arguments: Some("\"wei\"}".to_string()),
                }),
            }],
        );
        assert_eq!(acc.len(), 1);
        assert_eq!(acc[0].name, "wallet_address");
        assert_eq!(acc[0].arguments, "{\"unit\":\"wei\"}");
    }
}
