//! Channel registry: register and look up delivery channels by id.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Handle to a delivery channel ("sms", "whatsapp").
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "sms").
    fn id(&self) -> &str;
    /// Send a text reply to a recipient (the webhook's From value).
    async fn send_message(&self, to: &str, text: &str) -> Result<(), String>;
}

/// Registry of channel ids to handles. Shared across the gateway.
pub struct ChannelRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<dyn ChannelHandle>>>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, id: String, handle: Arc<dyn ChannelHandle>) {
        self.inner.write().await.insert(id, handle);
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn ChannelHandle>> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }
}
