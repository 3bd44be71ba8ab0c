//! Channel registry: running connectors by id.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::channels::outbound::OutboundMessage;

/// A running chat connector.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "telegram").
    fn id(&self) -> &str;
    /// Stop receiving updates.
    fn stop(&self);
    /// Send or edit one message.
    async fn deliver(&self, msg: &OutboundMessage) -> Result<(), String>;
}

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

    /// Register `handle` under its id; a previous handle with the same id is stopped.
    pub async fn register(&self, handle: Arc<dyn ChannelHandle>) {
        let id = handle.id().to_string();
        let mut g = self.inner.write().await;
        if let Some(old) = g.insert(id, handle) {
            old.stop();
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn ChannelHandle>> {
        let g = self.inner.read().await;
        g.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        let g = self.inner.read().await;
        let mut ids: Vec<String> = g.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn stop_all(&self) {
        let g = self.inner.read().await;
        for handle in g.values() {
            handle.stop();
        }
    }
}
