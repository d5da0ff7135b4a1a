use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::Json as JsonResponse,
};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::domains::translation::{
    dto::{BundleQuery, MissingResponse, ReloadResponse, TranslationResponse},
    state::TranslationState,
};
use crate::shared::utils::date_util::DateUtil;
use crate::system::locale::{LanguageSelection, LocaleError};

// Health check
pub async fn health(State(state): State<Arc<TranslationState>>) -> JsonResponse<Value> {
    JsonResponse(json!({
        "status": "healthy",
        "timestamp": DateUtil::to_rfc3339(&DateUtil::now()),
        "environment": state.shared_state.config.environment,
        "layers": state.shared_state.loader.layer_names(),
    }))
}

// Serve one bundle as a flat JSON object
pub async fn get_bundle(
    State(state): State<Arc<TranslationState>>,
    Query(query): Query<BundleQuery>,
) -> Result<JsonResponse<Value>, LocaleError> {
    let key = query.key()?;
    let bundle = state.source.resolve(&key).await.into_result()?;
    Ok(JsonResponse(Value::Object(bundle.resources)))
}

// Collect keys a client could not translate
pub async fn add_missing(
    State(state): State<Arc<TranslationState>>,
    Query(query): Query<BundleQuery>,
    Json(keys): Json<Map<String, Value>>,
) -> Result<(StatusCode, JsonResponse<MissingResponse>), LocaleError> {
    let key = query.key()?;
    if !state.shared_state.registry.is_supported(&key.language) {
        return Err(LocaleError::UnsupportedLanguage(key.language.to_string()));
    }
    for path in keys.keys() {
        info!("Missing translation {} in {}", path, key);
    }

    let recorded = state.record_missing(key.clone(), keys).await;
    Ok((
        StatusCode::CREATED,
        JsonResponse(MissingResponse {
            key: key.to_string(),
            recorded,
        }),
    ))
}

// Drop cached copies so the next request reads the resources directory again
pub async fn reload_bundle(
    State(state): State<Arc<TranslationState>>,
    Query(query): Query<BundleQuery>,
) -> Result<JsonResponse<ReloadResponse>, LocaleError> {
    let key = query.key()?;
    state.source.invalidate(&key);
    state.shared_state.loader.invalidate(&key);

    let reloaded = state.source.resolve(&key).await.is_found();
    Ok(JsonResponse(ReloadResponse {
        key: key.to_string(),
        reloaded,
    }))
}

// Translate one key in the request language
pub async fn translate(
    State(state): State<Arc<TranslationState>>,
    selection: LanguageSelection,
    Path(key): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<JsonResponse<TranslationResponse>, LocaleError> {
    let namespaces = state
        .shared_state
        .config
        .i18n
        .namespace_list()
        .map_err(|e| LocaleError::InvalidNamespace(e.to_string()))?;

    let session = state
        .shared_state
        .loader
        .session(&selection.language, &namespaces);
    session.load().await;

    let response = TranslationResponse {
        language: selection.language.to_string(),
        source: TranslationResponse::source_name(selection.source),
        value: session.t_with_params(&key, &params),
        ready: session.is_ready(),
        key,
    };
    session.close();

    Ok(JsonResponse(response))
}
