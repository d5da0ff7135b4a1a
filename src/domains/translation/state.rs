use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::shared::state::SharedState;
use crate::system::config::{ConfigError, LayerConfig, RenderContext};
use crate::system::locale::{LayeredLoader, ResourceKey};

/// How long served bundles stay in the in-process cache.
pub const SOURCE_CACHE_SECS: u64 = 300;

/// Bounds on reported missing keys held in memory.
pub const MAX_MISSING_BUNDLES: usize = 256;
pub const MAX_MISSING_KEYS_PER_BUNDLE: usize = 512;

#[derive(Debug, Clone, Copy)]
pub struct MissingLimits {
    pub bundles: usize,
    pub keys_per_bundle: usize,
}

impl Default for MissingLimits {
    fn default() -> Self {
        Self {
            bundles: MAX_MISSING_BUNDLES,
            keys_per_bundle: MAX_MISSING_KEYS_PER_BUNDLE,
        }
    }
}

/// State of the translation endpoints.
///
/// `source` serves bundles from the resources directory behind a memory
/// cache; the shared loader renders translations through the configured
/// layer chain.
#[derive(Debug)]
pub struct TranslationState {
    pub shared_state: Arc<SharedState>,
    pub source: LayeredLoader,
    missing: RwLock<HashMap<ResourceKey, Map<String, Value>>>,
    limits: MissingLimits,
}

impl TranslationState {
    pub fn new(shared_state: Arc<SharedState>) -> Result<Self, ConfigError> {
        let mut config = shared_state.config.i18n.clone();
        config.context = RenderContext::Server;
        config.save_missing = false;
        config.layers = vec![
            LayerConfig::Memory {
                expiration_secs: Some(SOURCE_CACHE_SECS),
            },
            LayerConfig::Filesystem {
                base_path: config.resources_path.clone(),
            },
        ];

        let source = shared_state.factory.build_loader(&config)?;
        Ok(Self {
            shared_state,
            source,
            missing: RwLock::new(HashMap::new()),
            limits: MissingLimits::default(),
        })
    }

    pub fn with_limits(mut self, limits: MissingLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Merges reported keys; returns how many were new. Keys beyond the
    /// configured limits are dropped.
    pub async fn record_missing(&self, key: ResourceKey, keys: Map<String, Value>) -> usize {
        let mut missing = self.missing.write().await;
        if !missing.contains_key(&key) && missing.len() >= self.limits.bundles {
            warn!("Dropping missing keys for {}: bundle limit reached", key);
            return 0;
        }

        let entry = missing.entry(key.clone()).or_default();
        let before = entry.len();
        for (path, value) in keys {
            if entry.len() >= self.limits.keys_per_bundle {
                warn!("Dropping missing keys for {}: key limit reached", key);
                break;
            }
            entry.entry(path).or_insert(value);
        }
        entry.len() - before
    }

    pub async fn missing_keys(&self, key: &ResourceKey) -> Option<Map<String, Value>> {
        self.missing.read().await.get(key).cloned()
    }
}
