use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use tokio::sync::RwLock;

use crate::error::AppResult;
use crate::models::{ContentType, PersonalizationRecord};

/// Key of a persisted personalization record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Recommendations,
    ContentAnalysis(ContentType, u64),
    WatchlistInsights,
    MoodRecommendation,
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKey::Recommendations => write!(f, "personalization:recommendations"),
            StoreKey::ContentAnalysis(content_type, id) => {
                write!(f, "analysis:{}:{}", content_type, id)
            }
            StoreKey::WatchlistInsights => write!(f, "insights:watchlist"),
            StoreKey::MoodRecommendation => write!(f, "personalization:mood_recommendation"),
        }
    }
}

/// Durable key-value tier.
///
/// Values are opaque serialized records. Implementations are local,
/// single-device and may be eventually consistent: a `get` right after a `put`
/// is allowed to miss.
#[async_trait::async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get(&self, key: &StoreKey) -> AppResult<Option<String>>;

    async fn put(&self, key: &StoreKey, value: String) -> AppResult<()>;

    async fn delete(&self, key: &StoreKey) -> AppResult<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Loads and decodes a record. Any failure is logged and reported as absent.
pub async fn load_record<T: DeserializeOwned>(
    store: &dyn PersistentStore,
    key: &StoreKey,
) -> Option<PersonalizationRecord<T>> {
    let raw = match store.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, key = %key, backend = store.name(), "Store read failed");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(error = %e, key = %key, "Discarding undecodable record");
            None
        }
    }
}

/// Encodes and writes a record. Failures are logged and swallowed: the durable
/// tier is best-effort.
pub async fn save_record<T: Serialize>(
    store: &dyn PersistentStore,
    key: &StoreKey,
    record: &PersonalizationRecord<T>,
) {
    let json = match serde_json::to_string(record) {
        Ok(j) => j,
        Err(e) => {
            tracing::error!(error = %e, key = %key, "Record serialization error");
            return;
        }
    };

    if let Err(e) = store.put(key, json).await {
        tracing::warn!(error = %e, key = %key, backend = store.name(), "Store write failed");
    }
}

/// Process-local store, for tests and hosts without a durable backend
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait::async_trait]
impl PersistentStore for InMemoryStore {
    async fn get(&self, key: &StoreKey) -> AppResult<Option<String>> {
        Ok(self.records.read().await.get(&key.to_string()).cloned())
    }

    async fn put(&self, key: &StoreKey, value: String) -> AppResult<()> {
        self.records.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &StoreKey) -> AppResult<()> {
        self.records.write().await.remove(&key.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::Fingerprint;

    struct FailingStore;

    #[async_trait::async_trait]
    impl PersistentStore for FailingStore {
        async fn get(&self, _key: &StoreKey) -> AppResult<Option<String>> {
            Err(AppError::Internal("disk unavailable".to_string()))
        }

        async fn put(&self, _key: &StoreKey, _value: String) -> AppResult<()> {
            Err(AppError::Internal("disk full".to_string()))
        }

        async fn delete(&self, _key: &StoreKey) -> AppResult<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_store_key_display() {
        assert_eq!(
            StoreKey::Recommendations.to_string(),
            "personalization:recommendations"
        );
        assert_eq!(
            StoreKey::ContentAnalysis(ContentType::Tv, 1399).to_string(),
            "analysis:tv:1399"
        );
        assert_eq!(StoreKey::WatchlistInsights.to_string(), "insights:watchlist");
    }

    #[tokio::test]
    async fn test_record_round_trip_through_memory_store() {
        let store = InMemoryStore::new();
        let record = PersonalizationRecord::new(Fingerprint::new("1-movie"), vec![7u64]);

        save_record(&store, &StoreKey::Recommendations, &record).await;
        let loaded: PersonalizationRecord<Vec<u64>> =
            load_record(&store, &StoreKey::Recommendations).await.unwrap();
        assert_eq!(loaded, record);

        store.delete(&StoreKey::Recommendations).await.unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let record = PersonalizationRecord::new(Fingerprint::new("f"), 1u8);
        save_record(&FailingStore, &StoreKey::WatchlistInsights, &record).await;

        let loaded: Option<PersonalizationRecord<u8>> =
            load_record(&FailingStore, &StoreKey::WatchlistInsights).await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_record_is_absent() {
        let store = InMemoryStore::new();
        store
            .put(&StoreKey::Recommendations, "not json".to_string())
            .await
            .unwrap();

        let loaded: Option<PersonalizationRecord<Vec<u64>>> =
            load_record(&store, &StoreKey::Recommendations).await;
        assert!(loaded.is_none());
    }
}
