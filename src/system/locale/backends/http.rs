use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::system::locale::backend::{Backend, LayerError, WriteAck};
use crate::system::locale::resource::{Bundle, ResourceKey};

pub const DEFAULT_LOAD_PATH: &str = "/locales?lng={{lng}}&ns={{ns}}";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct HttpBackendOptions {
    pub base_url: String,
    /// Appended to `base_url`; `{{lng}}` and `{{ns}}` are substituted.
    pub load_path: String,
    pub add_path: Option<String>,
    pub timeout: Duration,
    /// Sent as `Cache-Control` on load requests.
    pub cache: Option<String>,
    /// Sent as `Sec-Fetch-Mode` on load requests.
    pub request_mode: Option<String>,
    pub headers: HashMap<String, String>,
}

impl HttpBackendOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            load_path: DEFAULT_LOAD_PATH.to_string(),
            add_path: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            cache: None,
            request_mode: None,
            headers: HashMap::new(),
        }
    }
}

/// Authoritative layer fetching bundles over HTTP.
#[derive(Debug)]
pub struct HttpBackend {
    name: String,
    client: Client,
    options: HttpBackendOptions,
}

impl HttpBackend {
    pub fn new(client: Client, options: HttpBackendOptions) -> Self {
        Self {
            name: "http".to_string(),
            client,
            options,
        }
    }

    pub fn load_url(&self, key: &ResourceKey) -> String {
        build_url(&self.options.base_url, &self.options.load_path, key)
    }

    pub fn add_url(&self, key: &ResourceKey) -> Option<String> {
        self.options
            .add_path
            .as_deref()
            .map(|path| build_url(&self.options.base_url, path, key))
    }
}

fn build_url(base_url: &str, path: &str, key: &ResourceKey) -> String {
    let path = path
        .replace("{{lng}}", key.language.as_str())
        .replace("{{ns}}", key.namespace.as_str());
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

fn classify(error: reqwest::Error) -> LayerError {
    if error.is_timeout() {
        LayerError::Timeout
    } else if error.is_decode() {
        LayerError::Decode(error.to_string())
    } else if let Some(status) = error.status() {
        LayerError::Status(status.as_u16())
    } else {
        LayerError::Unreachable(error.to_string())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self, key: &ResourceKey) -> Result<Option<Bundle>, LayerError> {
        let url = self.load_url(key);
        debug!("{}: GET {}", self.name, url);

        let mut request = self.client.get(&url).timeout(self.options.timeout);
        if let Some(cache) = &self.options.cache {
            request = request.header(reqwest::header::CACHE_CONTROL, cache);
        }
        if let Some(mode) = &self.options.request_mode {
            request = request.header("sec-fetch-mode", mode);
        }
        for (name, value) in &self.options.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(LayerError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(classify)?;
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| LayerError::Decode(format!("{}: {}", url, e)))?;

        Bundle::from_value(key.clone(), value)
            .map(Some)
            .ok_or_else(|| LayerError::Decode(format!("{}: body is not a JSON object", url)))
    }

    async fn create(
        &self,
        key: &ResourceKey,
        missing: &Map<String, Value>,
    ) -> Result<WriteAck, LayerError> {
        let Some(url) = self.add_url(key) else {
            return Ok(WriteAck::Ignored);
        };
        debug!("{}: POST {} ({} keys)", self.name, url, missing.len());

        let mut request = self
            .client
            .post(&url)
            .timeout(self.options.timeout)
            .json(missing);
        for (name, value) in &self.options.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(classify)?;
        if !response.status().is_success() {
            return Err(LayerError::Status(response.status().as_u16()));
        }
        Ok(WriteAck::Stored)
    }
}
