use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::PgPool;

use crate::{AppError, AppResult};

/// Scoped key/value configuration with an explicit load/save/clear
/// lifecycle. Scopes look like `kiosk:{id}` or `profile:{id}`.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self, scope: &str, key: &str) -> AppResult<Option<Value>>;
    async fn save(&self, scope: &str, key: &str, value: Value) -> AppResult<()>;
    /// Returns whether an entry existed.
    async fn clear(&self, scope: &str, key: &str) -> AppResult<bool>;
}

pub async fn load_typed<T: DeserializeOwned>(store: &dyn ConfigStore, scope: &str, key: &str) -> AppResult<Option<T>> {
    store
        .load(scope, key)
        .await?
        .map(|value| {
            serde_json::from_value(value)
                .map_err(|e| AppError::Internal(format!("Stored config {}/{} is malformed: {}", scope, key, e)))
        })
        .transpose()
}

pub async fn save_typed<T: Serialize + Sync>(store: &dyn ConfigStore, scope: &str, key: &str, value: &T) -> AppResult<()> {
    let value = serde_json::to_value(value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize config {}/{}: {}", scope, key, e)))?;
    store.save(scope, key, value).await
}

pub struct PgConfigStore {
    db: PgPool,
}

impl PgConfigStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    async fn load(&self, scope: &str, key: &str) -> AppResult<Option<Value>> {
        let value = sqlx::query_scalar::<_, Value>(
            r#"SELECT value FROM "ConfigEntries" WHERE scope = $1 AND key = $2"#,
        )
        .bind(scope)
        .bind(key)
        .fetch_optional(&self.db)
        .await?;

        Ok(value)
    }

    async fn save(&self, scope: &str, key: &str, value: Value) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO "ConfigEntries" (scope, key, value, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (scope, key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(scope)
        .bind(key)
        .bind(value)
        .execute(&self.db)
        .await?;

        tracing::debug!(scope, key, "Config entry saved");
        Ok(())
    }

    async fn clear(&self, scope: &str, key: &str) -> AppResult<bool> {
        let result = sqlx::query(r#"DELETE FROM "ConfigEntries" WHERE scope = $1 AND key = $2"#)
            .bind(scope)
            .bind(key)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryConfigStore;
    use super::*;
    use crate::models::KioskDeviceConfig;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_load_save_clear_lifecycle() {
        let store = MemoryConfigStore::default();
        assert!(store.load("profile:1", "filters").await.unwrap().is_none());

        store.save("profile:1", "filters", json!({"status": "active"})).await.unwrap();
        assert_eq!(
            store.load("profile:1", "filters").await.unwrap(),
            Some(json!({"status": "active"}))
        );
        assert!(store.load("profile:2", "filters").await.unwrap().is_none());

        assert!(store.clear("profile:1", "filters").await.unwrap());
        assert!(!store.clear("profile:1", "filters").await.unwrap());
        assert!(store.load("profile:1", "filters").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_typed_kiosk_config() {
        let store = MemoryConfigStore::default();
        let config = KioskDeviceConfig {
            kiosk_id: Uuid::new_v4(),
            device_fingerprint: "fp-abc".to_string(),
            configured_at: Utc::now(),
        };
        save_typed(&store, "kiosk:x", "device", &config).await.unwrap();
        let loaded: Option<KioskDeviceConfig> = load_typed(&store, "kiosk:x", "device").await.unwrap();
        assert_eq!(loaded, Some(config));
    }

    #[tokio::test]
    async fn test_malformed_typed_load_errors() {
        let store = MemoryConfigStore::default();
        store.save("kiosk:x", "device", json!({"kiosk_id": 5})).await.unwrap();
        let loaded = load_typed::<KioskDeviceConfig>(&store, "kiosk:x", "device").await;
        assert!(loaded.is_err());
    }
}
