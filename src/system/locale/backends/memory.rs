use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::shared::utils::date_util::Duration;
use crate::system::locale::backend::{Backend, LayerError, WriteAck};
use crate::system::locale::resource::{Bundle, ResourceKey};

/// In-process bundle cache, optionally expiring entries after a TTL.
#[derive(Debug)]
pub struct MemoryBackend {
    name: String,
    ttl: Option<Duration>,
    entries: RwLock<HashMap<ResourceKey, Bundle>>,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ttl: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Seeds an entry exactly as given, expiration included.
    pub async fn insert(&self, bundle: Bundle) {
        let mut entries = self.entries.write().await;
        entries.insert(bundle.key.clone(), bundle);
    }

    /// Raw entry, returned even when expired.
    pub async fn peek(&self, key: &ResourceKey) -> Option<Bundle> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self, key: &ResourceKey) -> Result<Option<Bundle>, LayerError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).filter(|bundle| !bundle.is_expired()).cloned())
    }

    async fn write(&self, key: &ResourceKey, bundle: &Bundle) -> Result<WriteAck, LayerError> {
        let mut stored = bundle.clone();
        stored.expires_at = None;
        if let Some(ttl) = self.ttl {
            stored = stored.with_expiration(ttl);
        }

        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(key) {
            if existing.fetched_at > stored.fetched_at {
                return Ok(WriteAck::Ignored);
            }
        }
        entries.insert(key.clone(), stored);
        Ok(WriteAck::Stored)
    }
}
