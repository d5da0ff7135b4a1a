use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::system::locale::backend::{Backend, LayerError};
use crate::system::locale::language::LanguageTag;
use crate::system::locale::resource::{Bundle, ResourceKey};

pub const DEFAULT_RESOURCES_PATH: &str = "locales";

/// Reads bundles from `<base>/<lng>/<ns>.json`. Read-only.
#[derive(Debug)]
pub struct FilesystemBackend {
    name: String,
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            name: "filesystem".to_string(),
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn bundle_path(&self, key: &ResourceKey) -> PathBuf {
        self.base_path
            .join(key.language.as_str())
            .join(format!("{}.json", key.namespace))
    }

    /// Languages with a directory under the base path.
    pub async fn available_languages(&self) -> Result<Vec<LanguageTag>, LayerError> {
        let mut available_languages = Vec::new();

        if !self.base_path.exists() {
            return Ok(available_languages);
        }

        let mut entries = tokio::fs::read_dir(&self.base_path)
            .await
            .map_err(|e| LayerError::Storage(format!("Failed to read locale directory: {}", e)))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LayerError::Storage(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(language) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| LanguageTag::parse(name).ok())
            {
                available_languages.push(language);
            }
        }

        available_languages.sort();
        Ok(available_languages)
    }
}

#[async_trait]
impl Backend for FilesystemBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self, key: &ResourceKey) -> Result<Option<Bundle>, LayerError> {
        let file_path = self.bundle_path(key);

        let content = match tokio::fs::read_to_string(&file_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LayerError::Storage(format!(
                    "Failed to read locale file {:?}: {}",
                    file_path, e
                )));
            }
        };

        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            LayerError::Decode(format!("Failed to parse locale file {:?}: {}", file_path, e))
        })?;

        Bundle::from_value(key.clone(), value)
            .map(Some)
            .ok_or_else(|| LayerError::Decode(format!("{:?} is not a JSON object", file_path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::locale::backend::WriteAck;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_locale_files(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
        fs::create_dir_all(dir.join("en"))?;
        fs::create_dir_all(dir.join("vi"))?;
        fs::write(
            dir.join("en").join("common.json"),
            serde_json::to_string_pretty(&json!({
                "hello": "Hello",
                "welcome": "Welcome, {{name}}!"
            }))?,
        )?;
        fs::write(
            dir.join("vi").join("common.json"),
            serde_json::to_string_pretty(&json!({ "hello": "Xin chào" }))?,
        )?;
        fs::write(dir.join("vi").join("broken.json"), "[1, 2")?;
        fs::write(dir.join("vi").join("list.json"), "[1, 2]")?;
        fs::write(dir.join("README.md"), "not a language")?;
        Ok(())
    }

    #[tokio::test]
    async fn test_bundle_loading() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        create_test_locale_files(temp_dir.path())?;

        let backend = FilesystemBackend::new(temp_dir.path());

        let en = backend.read(&ResourceKey::parse("en", "common")?).await?.unwrap();
        assert_eq!(en.get_str("hello"), Some("Hello"));
        assert!(en.expires_at.is_none());

        let vi = backend.read(&ResourceKey::parse("vi", "common")?).await?.unwrap();
        assert_eq!(vi.get_str("hello"), Some("Xin chào"));

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_and_malformed_files() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        create_test_locale_files(temp_dir.path())?;

        let backend = FilesystemBackend::new(temp_dir.path());

        assert!(backend.read(&ResourceKey::parse("en", "footer")?).await?.is_none());
        assert!(backend.read(&ResourceKey::parse("ja", "common")?).await?.is_none());
        assert!(matches!(
            backend.read(&ResourceKey::parse("vi", "broken")?).await,
            Err(LayerError::Decode(_))
        ));
        assert!(matches!(
            backend.read(&ResourceKey::parse("vi", "list")?).await,
            Err(LayerError::Decode(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_writes_are_ignored() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let backend = FilesystemBackend::new(temp_dir.path());
        let key = ResourceKey::parse("en", "common")?;
        let bundle = Bundle::from_value(key.clone(), json!({ "hello": "Hello" })).unwrap();

        assert_eq!(backend.write(&key, &bundle).await?, WriteAck::Ignored);
        assert!(backend.read(&key).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_available_languages() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        create_test_locale_files(temp_dir.path())?;

        let backend = FilesystemBackend::new(temp_dir.path());
        let available = backend.available_languages().await?;
        assert_eq!(available, vec![LanguageTag::parse("en")?, LanguageTag::parse("vi")?]);

        let missing = FilesystemBackend::new(temp_dir.path().join("nope"));
        assert!(missing.available_languages().await?.is_empty());

        Ok(())
    }
}
