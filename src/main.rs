use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use i18n_chain::domains::translation::{router, state::TranslationState};
use i18n_chain::system::{config::AppConfig, logging::init_tracing};
use i18n_chain::{LanguageTag, Readiness, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config.log)?;
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log.level);

    let shared_state = Arc::new(SharedState::initialize(config.clone())?);
    info!("Translation layers: {:?}", shared_state.loader.layer_names());

    let translation_state = Arc::new(TranslationState::new(Arc::clone(&shared_state))?);
    let app = router(translation_state);

    // Bind before preloading so an HTTP layer pointing at this server can connect
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    let languages: Vec<String> = std::env::args().skip(1).collect();
    let preload = if languages.is_empty() {
        config.i18n.preload_languages()?
    } else {
        languages
            .iter()
            .map(|l| LanguageTag::parse(l))
            .collect::<Result<Vec<_>, _>>()?
    };
    tokio::spawn(preload_languages(Arc::clone(&shared_state), preload));

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    shared_state.loader.shutdown().await;
    Ok(())
}

async fn preload_languages(state: Arc<SharedState>, languages: Vec<LanguageTag>) {
    let namespaces = match state.config.i18n.namespace_list() {
        Ok(namespaces) => namespaces,
        Err(e) => {
            warn!("Skipping preload: {}", e);
            return;
        }
    };

    for language in languages {
        let session = state.loader.session(&language, &namespaces);
        match session.load().await {
            Readiness::Ready => info!("Preloaded {} ({} namespaces)", language, namespaces.len()),
            Readiness::NotReady => warn!("Preload of {} did not complete", language),
        }
        session.close();
    }
    state.loader.settle().await;
}
