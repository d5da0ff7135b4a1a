use std::sync::Arc;

use crate::system::config::{AppConfig, ConfigError};
use crate::system::locale::{LanguageRegistry, LayerFactory, LayeredLoader};

/// Global shared state containing system-level dependencies.
/// Cloning shares the loader and the factory's persistent stores.
#[derive(Clone, Debug)]
pub struct SharedState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<LanguageRegistry>,
    pub factory: Arc<LayerFactory>,
    pub loader: LayeredLoader,
}

impl SharedState {
    pub fn initialize(config: AppConfig) -> Result<Self, ConfigError> {
        let factory = LayerFactory::new()?;
        Self::with_factory(config, factory)
    }

    pub fn with_factory(config: AppConfig, factory: LayerFactory) -> Result<Self, ConfigError> {
        let registry = config.i18n.language_registry()?;
        let loader = factory.build_loader(&config.i18n)?;

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            factory: Arc::new(factory),
            loader,
        })
    }
}
