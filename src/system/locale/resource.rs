use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::language::{LanguageTag, LocaleError, Namespace};
use crate::shared::utils::date_util::{DateTime, DateUtil, Duration};

/// Identifies one translation bundle: a language and a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub language: LanguageTag,
    pub namespace: Namespace,
}

impl ResourceKey {
    pub fn new(language: LanguageTag, namespace: Namespace) -> Self {
        Self { language, namespace }
    }

    pub fn parse(language: &str, namespace: &str) -> Result<Self, LocaleError> {
        Ok(Self::new(LanguageTag::parse(language)?, Namespace::parse(namespace)?))
    }

    /// Every (language, namespace) combination, languages outermost.
    pub fn cartesian(languages: &[LanguageTag], namespaces: &[Namespace]) -> Vec<ResourceKey> {
        languages
            .iter()
            .flat_map(|lang| {
                namespaces
                    .iter()
                    .map(move |ns| ResourceKey::new(lang.clone(), ns.clone()))
            })
            .collect()
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.language, self.namespace)
    }
}

/// Translations for one [`ResourceKey`].
///
/// `resources` is the raw JSON object served by the backend: values are
/// strings or nested objects. `fetched_at` is when the content left its
/// authoritative source; caches keep it unchanged so staleness can be judged
/// across layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub key: ResourceKey,
    pub resources: Map<String, Value>,
    pub fetched_at: DateTime,
    pub expires_at: Option<DateTime>,
}

impl Bundle {
    pub fn new(key: ResourceKey, resources: Map<String, Value>) -> Self {
        Self {
            key,
            resources,
            fetched_at: DateUtil::now(),
            expires_at: None,
        }
    }

    /// Builds a bundle from an arbitrary JSON value; only objects are valid bundles.
    pub fn from_value(key: ResourceKey, value: Value) -> Option<Self> {
        match value {
            Value::Object(resources) => Some(Self::new(key, resources)),
            _ => None,
        }
    }

    pub fn with_expiration(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(DateUtil::add_duration(&DateUtil::now(), ttl));
        self
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.as_ref().is_some_and(DateUtil::is_elapsed)
    }

    /// Looks up a dotted path (`nav.home.title`); a literal key containing
    /// dots wins over the nested interpretation.
    pub fn get(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.resources.get(path) {
            return Some(value);
        }

        let mut parts = path.split('.');
        let mut current = self.resources.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Compares translations only, ignoring timestamps.
    pub fn same_content(&self, other: &Bundle) -> bool {
        self.resources == other.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> ResourceKey {
        ResourceKey::parse("en", "client-page").unwrap()
    }

    #[test]
    fn test_resource_key_display() {
        assert_eq!(key().to_string(), "en|client-page");
        assert!(ResourceKey::parse("en", "a/b").is_err());
    }

    #[test]
    fn test_cartesian_keys() {
        let languages = vec![LanguageTag::parse("de").unwrap(), LanguageTag::parse("en").unwrap()];
        let namespaces = vec![Namespace::parse("common").unwrap(), Namespace::parse("footer").unwrap()];

        let keys: Vec<String> = ResourceKey::cartesian(&languages, &namespaces)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(keys, vec!["de|common", "de|footer", "en|common", "en|footer"]);
    }

    #[test]
    fn test_nested_lookup() {
        let bundle = Bundle::from_value(
            key(),
            json!({
                "h1": "Hello",
                "nav": { "home": { "title": "Home" } },
                "a.b": "literal"
            }),
        )
        .unwrap();

        assert_eq!(bundle.get_str("h1"), Some("Hello"));
        assert_eq!(bundle.get_str("nav.home.title"), Some("Home"));
        assert_eq!(bundle.get_str("a.b"), Some("literal"));
        assert!(bundle.get("nav.missing").is_none());
        assert!(bundle.get_str("nav").is_none());
        assert_eq!(bundle.len(), 3);
    }

    #[test]
    fn test_non_object_is_not_a_bundle() {
        assert!(Bundle::from_value(key(), json!(["h1"])).is_none());
        assert!(Bundle::from_value(key(), json!("Hello")).is_none());
    }

    #[test]
    fn test_expiration() {
        let fresh = Bundle::from_value(key(), json!({"h1": "Hello"}))
            .unwrap()
            .with_expiration(DateUtil::seconds(60));
        assert!(!fresh.is_expired());

        let mut stale = fresh.clone();
        stale.expires_at = Some(DateUtil::sub_duration(&DateUtil::now(), DateUtil::seconds(1)));
        assert!(stale.is_expired());
        assert!(stale.same_content(&fresh));

        let eternal = Bundle::new(key(), Map::new());
        assert!(!eternal.is_expired());
        assert!(eternal.is_empty());
    }
}
