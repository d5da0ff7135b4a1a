use axum::{
    extract::{FromRequestParts, Query, Request, State},
    http::{HeaderMap, Uri, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{LanguageRegistry, LanguageTag, LocaleError};

pub const LANGUAGE_COOKIE: &str = "i18next";

// Query parameters for language detection
#[derive(Debug, Default, Deserialize)]
pub struct LanguageQuery {
    pub lng: Option<String>,
    pub locale: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageSource {
    Query,
    Header,
    Cookie,
    Default,
}

/// The language chosen for a request and the languages to load for it.
#[derive(Debug, Clone)]
pub struct LanguageSelection {
    pub language: LanguageTag,
    pub source: LanguageSource,
    pub fallbacks: Vec<LanguageTag>,
}

impl LanguageSelection {
    fn resolved(registry: &LanguageRegistry, requested: &LanguageTag, source: LanguageSource) -> Self {
        let language = registry.resolve(requested);
        let fallbacks = registry
            .languages_to_load(&language)
            .into_iter()
            .skip(1)
            .collect();
        Self {
            language,
            source,
            fallbacks,
        }
    }

    pub fn from_request(request: &Request) -> Option<Self> {
        request.extensions().get::<LanguageSelection>().cloned()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for LanguageSelection {
    type Rejection = LocaleError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<LanguageSelection>()
            .cloned()
            .ok_or_else(|| LocaleError::DetectionFailed("language middleware is not installed".to_string()))
    }
}

// Extract the preferred language from headers
pub fn extract_language_from_headers(headers: &HeaderMap) -> Option<String> {
    // Custom locale header first, unless it is empty or not a language tag
    let locale = headers
        .get("accept-locale")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| LanguageTag::parse(value).is_ok());
    if let Some(locale) = locale {
        return Some(locale.to_string());
    }

    headers
        .get("accept-language")
        .and_then(|value| value.to_str().ok())
        .and_then(parse_accept_language)
}

/// Highest-quality valid tag of an `Accept-Language` value; `*`, `q=0` and
/// unparseable entries are skipped.
pub fn parse_accept_language(accept_language: &str) -> Option<String> {
    // Parse "en-US,en;q=0.9,vi;q=0.8" format
    let mut languages: Vec<(String, f32)> = accept_language
        .split(',')
        .filter_map(|part| parse_language_with_quality(part.trim()))
        .filter(|(language, quality)| *quality > 0.0 && LanguageTag::parse(language).is_ok())
        .collect();

    // Stable sort keeps header order among equal qualities
    languages.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    languages.into_iter().next().map(|(language, _)| language)
}

fn parse_language_with_quality(part: &str) -> Option<(String, f32)> {
    if part.is_empty() {
        return None;
    }
    match part.split_once(';') {
        Some((language, params)) => {
            let quality = params
                .trim()
                .strip_prefix("q=")
                .and_then(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((language.trim().to_string(), quality))
        }
        None => Some((part.to_string(), 1.0)),
    }
}

pub fn extract_language_from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == LANGUAGE_COOKIE)
        .map(|(_, value)| value.trim().to_string())
}

pub fn extract_language_from_query(query: &LanguageQuery) -> Option<String> {
    query.lng.clone().or_else(|| query.locale.clone())
}

/// Detects the request language: query, then headers, then cookie, then
/// the registry default. Unparseable candidates are skipped.
pub fn detect_language(
    registry: &LanguageRegistry,
    headers: &HeaderMap,
    query: Option<&LanguageQuery>,
) -> LanguageSelection {
    let candidates = [
        (
            query.and_then(extract_language_from_query),
            LanguageSource::Query,
        ),
        (extract_language_from_headers(headers), LanguageSource::Header),
        (extract_language_from_cookie(headers), LanguageSource::Cookie),
    ];

    for (candidate, source) in candidates {
        if let Some(language) = candidate.and_then(|c| LanguageTag::parse(&c).ok()) {
            return LanguageSelection::resolved(registry, &language, source);
        }
    }

    LanguageSelection::resolved(registry, registry.default_language(), LanguageSource::Default)
}

fn query_from_uri(uri: &Uri) -> Option<LanguageQuery> {
    Query::<LanguageQuery>::try_from_uri(uri).ok().map(|Query(q)| q)
}

/// Stores a [`LanguageSelection`] in the request extensions.
pub async fn language_middleware(
    State(registry): State<Arc<LanguageRegistry>>,
    mut request: Request,
    next: Next,
) -> Response {
    let query = query_from_uri(request.uri());
    let selection = detect_language(&registry, request.headers(), query.as_ref());
    tracing::debug!("Request language {} ({:?})", selection.language, selection.source);

    request.extensions_mut().insert(selection);
    next.run(request).await
}
