//! LLM abstraction and the hosted Gaia chat client.
//!
//! Shared chat/tool wire types plus an OpenAI-compatible client for the
//! Gaia node endpoint (streaming optional, tools supported).

mod gaia;

pub use gaia::{GaiaClient, GaiaError};

use serde::{Deserialize, Serialize};

/// One message in a chat exchange (system/user/assistant/tool).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    /// When role is "assistant", tool calls requested by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// When role is "tool", the name of the tool this result is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            tool_calls: None,
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            tool_calls: None,
            tool_name: None,
        }
    }
}

/// One tool/function call in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(rename = "type", default)]
    pub typ: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Arguments as a JSON object (model-dependent; may be Null).
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Tool definition advertised to the model (OpenAI function format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub typ: String,
    pub function: ToolFunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunctionDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

/// Completed chat result: final assistant message (if any).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: Option<ChatMessage>,
    pub done: bool,
}

impl ChatResponse {
    /// Final assistant text ("" when the model produced none).
    pub fn content(&self) -> &str {
        self.message.as_ref().map(|m| m.content.as_str()).unwrap_or("")
    }

    /// Tool calls from the final message (empty when none).
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.message
            .as_ref()
            .and_then(|m| m.tool_calls.as_deref())
            .unwrap_or(&[])
    }
}
