pub mod domains;
pub mod shared;
pub mod system;

pub use shared::state::SharedState;
pub use system::config::{AppConfig, ConfigError, I18nConfig, LayerConfig, RenderContext, StoreConfig};
pub use system::locale::{
    Backend, Bundle, LanguageRegistry, LanguageTag, LayerError, LayerFactory, LayeredLoader,
    LoaderBuilder, LocaleError, Namespace, Readiness, Resolution, ResourceKey, Session,
    SessionEvent, SharedBackend, WriteAck,
};
