use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use super::backend::LayerError;
use super::resource::ResourceKey;
use crate::shared::utils::date_util::DateUtil;

static LANGUAGE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{2,3}(?:[-_][A-Za-z0-9]{1,8})*$").expect("valid regex"));

static NAMESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("valid regex"));

/// A normalised language tag such as `en`, `en-US` or `zh-Hant-TW`.
///
/// The primary subtag is lower-cased, four-letter script subtags are
/// title-cased and two-letter / three-digit region subtags are upper-cased.
/// Underscores are accepted on input and rewritten to hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageTag(String);

impl LanguageTag {
    pub fn parse(tag: &str) -> Result<Self, LocaleError> {
        let tag = tag.trim();
        if !LANGUAGE_TAG.is_match(tag) {
            return Err(LocaleError::InvalidLanguage(tag.to_string()));
        }

        let normalized = tag
            .split(['-', '_'])
            .enumerate()
            .map(|(index, part)| normalize_subtag(index, part))
            .collect::<Vec<_>>()
            .join("-");

        Ok(LanguageTag(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The primary language subtag alone (`en-US` -> `en`).
    pub fn base(&self) -> LanguageTag {
        match self.0.split_once('-') {
            Some((lang, _)) => LanguageTag(lang.to_string()),
            None => self.clone(),
        }
    }

    pub fn is_base(&self) -> bool {
        !self.0.contains('-')
    }
}

fn normalize_subtag(index: usize, part: &str) -> String {
    if index == 0 {
        return part.to_lowercase();
    }
    let is_alpha = part.chars().all(|c| c.is_ascii_alphabetic());
    let is_digit = part.chars().all(|c| c.is_ascii_digit());
    match part.len() {
        2 if is_alpha => part.to_uppercase(),
        3 if is_digit => part.to_string(),
        4 if is_alpha => {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        }
        _ => part.to_lowercase(),
    }
}

impl FromStr for LanguageTag {
    type Err = LocaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LanguageTag::parse(s)
    }
}

impl TryFrom<String> for LanguageTag {
    type Error = LocaleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        LanguageTag::parse(&value)
    }
}

impl From<LanguageTag> for String {
    fn from(tag: LanguageTag) -> Self {
        tag.0
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A translation namespace (`common`, `footer`, `client-page`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    pub fn parse(ns: &str) -> Result<Self, LocaleError> {
        let ns = ns.trim();
        if !NAMESPACE.is_match(ns) {
            return Err(LocaleError::InvalidNamespace(ns.to_string()));
        }
        Ok(Namespace(ns.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Namespace {
    type Err = LocaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::parse(s)
    }
}

impl TryFrom<String> for Namespace {
    type Error = LocaleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Namespace::parse(&value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LocaleError {
    #[error("Invalid language tag: {0}")]
    InvalidLanguage(String),
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Language detection failed: {0}")]
    DetectionFailed(String),
    #[error("Bundle {key} is unavailable{}", .cause.as_ref().map(|c| format!(" ({c})")).unwrap_or_default())]
    BundleMissing {
        key: ResourceKey,
        cause: Option<LayerError>,
    },
}

impl IntoResponse for LocaleError {
    fn into_response(self) -> Response {
        let status = match &self {
            LocaleError::InvalidLanguage(_)
            | LocaleError::InvalidNamespace(_)
            | LocaleError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
            LocaleError::DetectionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LocaleError::BundleMissing { cause: Some(_), .. } => StatusCode::SERVICE_UNAVAILABLE,
            LocaleError::BundleMissing { cause: None, .. } => StatusCode::NOT_FOUND,
        };

        let body = Json(serde_json::json!({
            "error": "LOCALE_ERROR",
            "message": self.to_string(),
            "timestamp": DateUtil::to_rfc3339(&DateUtil::now())
        }));

        (status, body).into_response()
    }
}

/// Supported languages, the default language and explicit fallback chains.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    supported_languages: Vec<LanguageTag>,
    default_language: LanguageTag,
    fallback_chain: HashMap<LanguageTag, Vec<LanguageTag>>,
}

impl LanguageRegistry {
    pub fn new(default_language: LanguageTag) -> Self {
        Self {
            supported_languages: vec![default_language.clone()],
            default_language,
            fallback_chain: HashMap::new(),
        }
    }

    pub fn is_supported(&self, language: &LanguageTag) -> bool {
        self.supported_languages.contains(language)
    }

    pub fn supported_languages(&self) -> &[LanguageTag] {
        &self.supported_languages
    }

    pub fn default_language(&self) -> &LanguageTag {
        &self.default_language
    }

    /// Explicit chain for `language`, or the default language when none is set.
    pub fn fallback_chain(&self, language: &LanguageTag) -> Vec<LanguageTag> {
        self.fallback_chain
            .get(language)
            .or_else(|| self.fallback_chain.get(&language.base()))
            .cloned()
            .unwrap_or_else(|| vec![self.default_language.clone()])
    }

    /// Picks the closest supported language: exact tag, then its base, then the default.
    pub fn resolve(&self, requested: &LanguageTag) -> LanguageTag {
        if self.is_supported(requested) {
            return requested.clone();
        }
        let base = requested.base();
        if self.is_supported(&base) {
            return base;
        }
        self.default_language.clone()
    }

    /// Every language whose bundles are needed to render `language`, in lookup order.
    pub fn languages_to_load(&self, language: &LanguageTag) -> Vec<LanguageTag> {
        let mut languages = vec![language.clone()];
        if !language.is_base() {
            languages.push(language.base());
        }
        languages.extend(self.fallback_chain(language));
        languages.push(self.default_language.clone());

        let mut seen = Vec::with_capacity(languages.len());
        languages.retain(|lang| {
            if seen.contains(lang) {
                false
            } else {
                seen.push(lang.clone());
                true
            }
        });
        languages
    }

    pub fn add_language(&mut self, language: LanguageTag, fallback_chain: Option<Vec<LanguageTag>>) {
        if !self.supported_languages.contains(&language) {
            self.supported_languages.push(language.clone());
        }

        if let Some(chain) = fallback_chain {
            self.fallback_chain.insert(language, chain);
        }
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new(LanguageTag("en".to_string()))
    }
}
