use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::system::locale::backends::filesystem::DEFAULT_RESOURCES_PATH;
use crate::system::locale::backends::http::{DEFAULT_LOAD_PATH, DEFAULT_TIMEOUT_MS};
use crate::system::locale::backends::local_storage::DEFAULT_PREFIX;
use crate::system::locale::{LanguageRegistry, LanguageTag, Namespace};

/// One week, the usual lifetime of a browser-side translation cache.
pub const DEFAULT_EXPIRATION_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid language in config: {0}")]
    InvalidLanguage(String),
    #[error("Invalid namespace in config: {0}")]
    InvalidNamespace(String),
    #[error("At least one layer is required in the client context")]
    EmptyLayers,
    #[error("Invalid layer config: {0}")]
    InvalidLayer(String),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub file_path: Option<String>,
}

/// Where translations are rendered. The client context talks to the
/// network and therefore needs explicit layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderContext {
    #[default]
    Client,
    Server,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-process store; layers naming the same store share it.
    Memory {
        #[serde(default = "default_store_name")]
        name: String,
    },
    File { path: String },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory {
            name: default_store_name(),
        }
    }
}

/// One entry of the ordered layer list; first entry is checked first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerConfig {
    Memory {
        #[serde(default)]
        expiration_secs: Option<u64>,
    },
    LocalStorage {
        #[serde(default)]
        store: StoreConfig,
        #[serde(default = "default_prefix")]
        prefix: String,
        #[serde(default = "default_expiration_secs")]
        expiration_secs: u64,
        /// Per-language cache version; bumping it discards cached bundles.
        #[serde(default)]
        versions: HashMap<String, String>,
    },
    Http {
        base_url: String,
        #[serde(default = "default_load_path")]
        load_path: String,
        #[serde(default)]
        add_path: Option<String>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        #[serde(default)]
        cache: Option<String>,
        #[serde(default)]
        request_mode: Option<String>,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Filesystem {
        base_path: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct I18nConfig {
    pub supported_languages: Vec<String>,
    pub default_language: String,
    pub fallback_languages: HashMap<String, Vec<String>>,
    pub namespaces: Vec<String>,
    /// Languages the binary loads at startup.
    pub preload: Vec<String>,
    pub debug: bool,
    pub save_missing: bool,
    pub context: RenderContext,
    /// Root of the embedded filesystem loader used when `layers` is empty.
    pub resources_path: String,
    pub layers: Vec<LayerConfig>,
}

impl Default for I18nConfig {
    fn default() -> Self {
        Self {
            supported_languages: vec!["en".to_string()],
            default_language: "en".to_string(),
            fallback_languages: HashMap::new(),
            namespaces: vec!["common".to_string()],
            preload: vec!["en".to_string()],
            debug: false,
            save_missing: false,
            context: RenderContext::Client,
            resources_path: DEFAULT_RESOURCES_PATH.to_string(),
            layers: vec![
                LayerConfig::LocalStorage {
                    store: StoreConfig::default(),
                    prefix: default_prefix(),
                    expiration_secs: DEFAULT_EXPIRATION_SECS,
                    versions: HashMap::new(),
                },
                LayerConfig::Http {
                    base_url: "http://127.0.0.1:3000".to_string(),
                    load_path: default_load_path(),
                    add_path: None,
                    timeout_ms: DEFAULT_TIMEOUT_MS,
                    cache: Some("no-cache".to_string()),
                    request_mode: None,
                    headers: HashMap::new(),
                },
            ],
        }
    }
}

fn default_store_name() -> String {
    "default".to_string()
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_expiration_secs() -> u64 {
    DEFAULT_EXPIRATION_SECS
}

fn default_load_path() -> String {
    DEFAULT_LOAD_PATH.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn parse_language(value: &str) -> Result<LanguageTag, ConfigError> {
    LanguageTag::parse(value).map_err(|_| ConfigError::InvalidLanguage(value.to_string()))
}

impl I18nConfig {
    pub fn language_registry(&self) -> Result<LanguageRegistry, ConfigError> {
        let mut registry = LanguageRegistry::new(parse_language(&self.default_language)?);

        for language in &self.supported_languages {
            registry.add_language(parse_language(language)?, None);
        }

        for (language, chain) in &self.fallback_languages {
            let chain = chain
                .iter()
                .map(|l| parse_language(l))
                .collect::<Result<Vec<_>, _>>()?;
            registry.add_language(parse_language(language)?, Some(chain));
        }

        Ok(registry)
    }

    pub fn namespace_list(&self) -> Result<Vec<Namespace>, ConfigError> {
        self.namespaces
            .iter()
            .map(|ns| Namespace::parse(ns).map_err(|_| ConfigError::InvalidNamespace(ns.clone())))
            .collect()
    }

    pub fn preload_languages(&self) -> Result<Vec<LanguageTag>, ConfigError> {
        self.preload.iter().map(|l| parse_language(l)).collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.language_registry()?;
        self.preload_languages()?;
        if self.namespace_list()?.is_empty() {
            return Err(ConfigError::InvalidNamespace("no namespaces configured".to_string()));
        }

        if self.context == RenderContext::Client && self.layers.is_empty() {
            return Err(ConfigError::EmptyLayers);
        }

        for layer in &self.layers {
            match layer {
                LayerConfig::Memory { expiration_secs: Some(0) } => {
                    return Err(ConfigError::InvalidLayer("memory expiration must be positive".to_string()));
                }
                LayerConfig::LocalStorage { expiration_secs, versions, .. } => {
                    if *expiration_secs == 0 {
                        return Err(ConfigError::InvalidLayer(
                            "local storage expiration must be positive".to_string(),
                        ));
                    }
                    for language in versions.keys() {
                        parse_language(language)?;
                    }
                }
                LayerConfig::Http { base_url, load_path, .. } => {
                    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                        return Err(ConfigError::InvalidLayer(format!("unsupported base url {}", base_url)));
                    }
                    if !load_path.contains("{{lng}}") || !load_path.contains("{{ns}}") {
                        return Err(ConfigError::InvalidLayer(format!(
                            "load path {} must contain {{{{lng}}}} and {{{{ns}}}}",
                            load_path
                        )));
                    }
                }
                LayerConfig::Filesystem { base_path } if base_path.is_empty() => {
                    return Err(ConfigError::InvalidLayer("filesystem base path is empty".to_string()));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub log: LogConfig,
    #[serde(default)]
    pub i18n: I18nConfig,
    #[serde(default)]
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log: LogConfig {
                level: "info".to_string(),
                file_path: None,
            },
            i18n: I18nConfig::default(),
            environment: "default".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads `configs/config.{APP_ENV}.json`, falling back to
    /// `configs/config.default.json` and then to built-in defaults, and
    /// applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = env::var("APP_ENV").unwrap_or_else(|_| "default".to_string());
        let mut config = Self::load_from(Path::new("configs"), &environment)?;
        config.apply_overrides(|name| env::var(name).ok());
        config.i18n.validate()?;
        Ok(config)
    }

    pub fn load_from(dir: &Path, environment: &str) -> Result<Self, ConfigError> {
        let candidates = [
            dir.join(format!("config.{}.json", environment)),
            dir.join("config.default.json"),
        ];

        let mut config = match candidates.iter().find(|path| path.exists()) {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                serde_json::from_str(&content)?
            }
            None => AppConfig::default(),
        };

        // Environment field always reflects the actual environment
        config.environment = environment.to_string();
        Ok(config)
    }

    /// Applies `SERVER_*`, `LOG_*` and `I18N_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SERVER_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(file_path) = lookup("LOG_FILE_PATH") {
            self.log.file_path = Some(file_path);
        }

        if let Some(debug) = lookup("I18N_DEBUG").and_then(|v| parse_flag(&v)) {
            self.i18n.debug = debug;
        }
        if let Some(save_missing) = lookup("I18N_SAVE_MISSING").and_then(|v| parse_flag(&v)) {
            self.i18n.save_missing = save_missing;
        }
        if let Some(language) = lookup("I18N_DEFAULT_LANGUAGE") {
            self.i18n.default_language = language;
        }
        if let Some(languages) = lookup("I18N_SUPPORTED_LANGUAGES") {
            self.i18n.supported_languages = split_list(&languages);
        }
        if let Some(namespaces) = lookup("I18N_NAMESPACES") {
            self.i18n.namespaces = split_list(&namespaces);
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.i18n.validate().is_ok());
        assert_eq!(config.i18n.layers.len(), 2);
    }

    #[test]
    fn test_load_prefers_environment_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        fs::write(
            dir.path().join("config.default.json"),
            r#"{ "log": { "level": "warn", "file_path": null } }"#,
        )?;
        fs::write(
            dir.path().join("config.staging.json"),
            r#"{
                "log": { "level": "debug", "file_path": null },
                "i18n": {
                    "supported_languages": ["en", "de"],
                    "namespaces": ["client-page", "footer"],
                    "debug": true,
                    "layers": [
                        { "type": "local_storage", "expiration_secs": 60 },
                        { "type": "http", "base_url": "https://cdn.example.com", "cache": "no-store" }
                    ]
                }
            }"#,
        )?;

        let staging = AppConfig::load_from(dir.path(), "staging")?;
        assert_eq!(staging.environment, "staging");
        assert_eq!(staging.log.level, "debug");
        assert!(staging.i18n.debug);
        assert_eq!(staging.i18n.default_language, "en");
        assert_eq!(
            staging.i18n.layers[0],
            LayerConfig::LocalStorage {
                store: StoreConfig::Memory {
                    name: "default".to_string()
                },
                prefix: "i18next_res_".to_string(),
                expiration_secs: 60,
                versions: HashMap::new(),
            }
        );
        match &staging.i18n.layers[1] {
            LayerConfig::Http { load_path, timeout_ms, cache, .. } => {
                assert_eq!(load_path, DEFAULT_LOAD_PATH);
                assert_eq!(*timeout_ms, DEFAULT_TIMEOUT_MS);
                assert_eq!(cache.as_deref(), Some("no-store"));
            }
            other => panic!("unexpected layer {:?}", other),
        }
        staging.i18n.validate()?;

        let production = AppConfig::load_from(dir.path(), "production")?;
        assert_eq!(production.environment, "production");
        assert_eq!(production.log.level, "warn");

        let empty = TempDir::new()?;
        let fallback = AppConfig::load_from(empty.path(), "test")?;
        assert_eq!(fallback.log.level, "info");
        Ok(())
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SERVER_PORT", "8080"),
            ("LOG_LEVEL", "trace"),
            ("I18N_DEBUG", "yes"),
            ("I18N_SAVE_MISSING", "maybe"),
            ("I18N_DEFAULT_LANGUAGE", "vi"),
            ("I18N_SUPPORTED_LANGUAGES", "vi, en ,"),
            ("I18N_NAMESPACES", "common,footer"),
        ]);
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.log.level, "trace");
        assert!(config.i18n.debug);
        assert!(!config.i18n.save_missing);
        assert_eq!(config.i18n.default_language, "vi");
        assert_eq!(config.i18n.supported_languages, vec!["vi", "en"]);
        assert_eq!(config.i18n.namespaces, vec!["common", "footer"]);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = I18nConfig::default();
        config.layers.clear();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyLayers)));

        config.context = RenderContext::Server;
        assert!(config.validate().is_ok());

        let mut config = I18nConfig::default();
        config.default_language = "??".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLanguage(_))));

        let mut config = I18nConfig::default();
        config.namespaces = vec!["a/b".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidNamespace(_))));

        let mut config = I18nConfig::default();
        config.layers = vec![LayerConfig::Http {
            base_url: "https://cdn.example.com".to_string(),
            load_path: "/locales/{{lng}}.json".to_string(),
            add_path: None,
            timeout_ms: 1000,
            cache: None,
            request_mode: None,
            headers: HashMap::new(),
        }];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLayer(_))));

        let mut config = I18nConfig::default();
        config.layers = vec![LayerConfig::Memory { expiration_secs: Some(0) }];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLayer(_))));
    }

    #[test]
    fn test_language_registry_from_config() -> Result<(), Box<dyn std::error::Error>> {
        let mut config = I18nConfig::default();
        config.supported_languages = vec!["en".to_string(), "de".to_string()];
        config.fallback_languages = HashMap::from([(
            "de-CH".to_string(),
            vec!["de".to_string()],
        )]);

        let registry = config.language_registry()?;
        let de_ch = LanguageTag::parse("de-CH")?;
        assert!(registry.is_supported(&de_ch));
        assert_eq!(
            registry.languages_to_load(&de_ch),
            vec![de_ch.clone(), LanguageTag::parse("de")?, LanguageTag::parse("en")?]
        );
        Ok(())
    }
}
