use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::errors::StoreError;
use crate::models::UserProgress;

// Import logging macros
use crate::log_store_operation;

/// Storage key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "exam-prep-progress";

/// Raw key-value backend holding serialized progress documents.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn write(&self, key: &str, document: &str) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct SqliteProgressStore {
    pool: SqlitePool,
}

impl SqliteProgressStore {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = SqliteProgressStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS progress_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        log_store_operation!(info, "migrate", "progress_store table ready");
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM progress_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    async fn write(&self, key: &str, document: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO progress_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(document)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM progress_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Process-local store, used in tests and when the database cannot be opened.
#[derive(Default)]
pub struct MemoryProgressStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn write(&self, key: &str, document: &str) -> Result<(), StoreError> {
        self.entries()?.insert(key.to_string(), document.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Best-effort persistence of the progress record under a single key.
///
/// None of these operations report failure: a missing or unreadable record
/// loads as empty progress, and failed writes are logged and dropped.
#[derive(Clone)]
pub struct ProgressGateway {
    store: Arc<dyn ProgressStore>,
    storage_key: String,
}

impl ProgressGateway {
    pub fn new(store: Arc<dyn ProgressStore>, storage_key: impl Into<String>) -> Self {
        Self {
            store,
            storage_key: storage_key.into(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryProgressStore::new()), DEFAULT_STORAGE_KEY)
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub async fn load(&self) -> UserProgress {
        match self.try_load().await {
            Ok(Some(progress)) => progress,
            Ok(None) => {
                log_store_operation!(info, "load", "no stored progress, starting fresh");
                UserProgress::default()
            }
            Err(e) => {
                log_store_operation!(warn, "load", error = e, "starting with empty progress");
                UserProgress::default()
            }
        }
    }

    async fn try_load(&self) -> Result<Option<UserProgress>, StoreError> {
        let Some(document) = self.store.read(&self.storage_key).await? else {
            return Ok(None);
        };
        log_store_operation!(debug, "load", storage_key = self.storage_key, bytes = document.len());
        Ok(Some(serde_json::from_str(&document)?))
    }

    pub async fn save(&self, progress: &UserProgress) {
        if let Err(e) = self.try_save(progress).await {
            log_store_operation!(error, "save", error = e);
        }
    }

    async fn try_save(&self, progress: &UserProgress) -> Result<(), StoreError> {
        let document = serde_json::to_string(progress)?;
        self.store.write(&self.storage_key, &document).await?;
        log_store_operation!(debug, "save", storage_key = self.storage_key, bytes = document.len());
        Ok(())
    }

    pub async fn clear(&self) {
        if let Err(e) = self.store.delete(&self.storage_key).await {
            log_store_operation!(error, "clear", error = e);
        }
    }
}
