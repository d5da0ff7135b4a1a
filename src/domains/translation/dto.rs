use serde::{Deserialize, Serialize};

use crate::system::locale::{LanguageSource, LocaleError, ResourceKey};

// Same query shape the HTTP layer sends: ?lng=en&ns=common
#[derive(Debug, Deserialize)]
pub struct BundleQuery {
    pub lng: String,
    pub ns: String,
}

impl BundleQuery {
    pub fn key(&self) -> Result<ResourceKey, LocaleError> {
        ResourceKey::parse(&self.lng, &self.ns)
    }
}

#[derive(Debug, Serialize)]
pub struct TranslationResponse {
    pub language: String,
    pub source: String,
    pub key: String,
    pub value: Option<String>,
    pub ready: bool,
}

impl TranslationResponse {
    pub fn source_name(source: LanguageSource) -> String {
        match source {
            LanguageSource::Query => "query",
            LanguageSource::Header => "header",
            LanguageSource::Cookie => "cookie",
            LanguageSource::Default => "default",
        }
        .to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub key: String,
    pub reloaded: bool,
}

#[derive(Debug, Serialize)]
pub struct MissingResponse {
    pub key: String,
    pub recorded: usize,
}
