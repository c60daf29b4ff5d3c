//! Conversation threads and message history for the agent loop.
//!
//! Threads are keyed per sender (channel id + phone number) so callers never
//! share history. Texting "/new" clears the sender's thread.

use crate::llm::{ChatMessage, ToolCall};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread identifier: "{channel}:{from}", e.g. "sms:+15551234567".
pub fn thread_key(channel_id: &str, from: &str) -> String {
    format!("{}:{}", channel_id, from)
}

/// A thread: id and ordered message history.
#[derive(Debug, Clone)]
pub struct Thread {
    pub id: String,
    pub messages: Vec<ChatMessage>,
}

/// In-memory store of per-sender threads (get-or-create, append, reset).
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Thread>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create the thread if it does not exist; returns the id.
    pub async fn get_or_create(&self, id: impl Into<String>) -> String {
        let id = id.into();
        let mut g = self.inner.write().await;
        g.entry(id.clone()).or_insert_with(|| Thread {
            id: id.clone(),
            messages: Vec::new(),
        });
        id
    }

    /// Return a clone of the thread if it exists.
    pub async fn get(&self, id: &str) -> Option<Thread> {
        self.inner.read().await.get(id).cloned()
    }

    /// Append a message to the thread; error if the thread does not exist.
    pub async fn append_message(
        &self,
        id: &str,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), String> {
        self.append_message_full(id, role, content, None, None).await
    }

    /// Append with optional tool_calls (assistant) or tool_name (tool result).
    pub async fn append_message_full(
        &self,
        id: &str,
        role: impl Into<String>,
        content: impl Into<String>,
        tool_calls: Option<Vec<ToolCall>>,
        tool_name: Option<String>,
    ) -> Result<(), String> {
        let mut g = self.inner.write().await;
        let thread = g.get_mut(id).ok_or_else(|| "thread not found".to_string())?;
        thread.messages.push(ChatMessage {
            role: role.into(),
            content: content.into(),
            tool_calls,
            tool_name,
        });
        Ok(())
    }

    /// Drop the thread's history (the "/new" trigger). No-op when the thread does not exist.
    pub async fn reset(&self, id: &str) {
        if let Some(thread) = self.inner.write().await.get_mut(id) {
            thread.messages.clear();
        }
    }
}
