use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::resource::{Bundle, ResourceKey};

/// Why a layer (or the loader itself) could not produce a bundle.
///
/// Cloneable so a single failure can be attached to every coalesced caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayerError {
    #[error("network unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out")]
    Timeout,
    #[error("malformed bundle: {0}")]
    Decode(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("loader has been shut down")]
    ShutDown,
    #[error("resolve task aborted")]
    Aborted,
}

/// Outcome of a write or create on a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAck {
    Stored,
    /// The layer does not keep bundles (read-only source, no add path, older content).
    Ignored,
}

/// One layer of the loader chain.
///
/// `read` returns `Ok(None)` both for absent and for expired entries; an
/// expired entry must be left in place so that a failed refresh does not lose it.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn read(&self, key: &ResourceKey) -> Result<Option<Bundle>, LayerError>;

    async fn write(&self, _key: &ResourceKey, _bundle: &Bundle) -> Result<WriteAck, LayerError> {
        Ok(WriteAck::Ignored)
    }

    /// Contributes keys the application could not find (add path).
    async fn create(
        &self,
        _key: &ResourceKey,
        _missing: &Map<String, Value>,
    ) -> Result<WriteAck, LayerError> {
        Ok(WriteAck::Ignored)
    }
}

pub type SharedBackend = Arc<dyn Backend>;
