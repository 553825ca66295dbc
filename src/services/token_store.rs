// src/services/token_store.rs
//! Persistent per-user store of linked Google OAuth grants

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use tracing::debug;

use crate::services::encryption::{EncryptionError, EncryptionService};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Encryption error: {0}")]
    Encryption(#[from] EncryptionError),
}

/// One user's linked Google OAuth grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user_id: String,
    pub access_token: String,
    /// Empty when the provider never issued one; such a record cannot be refreshed.
    pub refresh_token: String,
    pub id_token: Option<String>,
    /// Absolute expiry, epoch seconds
    pub expires_at: i64,
    /// Space-delimited grant scope
    pub scope: String,
}

impl TokenRecord {
    pub fn remaining_secs(&self, now: i64) -> i64 {
        self.expires_at - now
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

/// Storage contract used by the token service. Writes are upserts keyed by `user_id`.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Insert or update. An empty `refresh_token` never replaces a stored one.
    async fn upsert(&self, record: &TokenRecord) -> Result<(), StoreError>;

    /// Returns whether a row was removed
    async fn delete(&self, user_id: &str) -> Result<bool, StoreError>;
}

#[derive(FromRow)]
struct TokenRow {
    user_id: String,
    access_token: String,
    refresh_token: String,
    id_token: Option<String>,
    expires_at: i64,
    scope: String,
}

/// SQLite-backed store, optionally sealing tokens with AES-256-GCM
#[derive(Debug)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
    encryption: Option<EncryptionService>,
}

impl SqliteTokenStore {
    pub fn new(pool: SqlitePool, encryption: Option<EncryptionService>) -> Self {
        Self { pool, encryption }
    }

    fn seal(&self, value: &str) -> Result<String, StoreError> {
        match &self.encryption {
            Some(service) => Ok(service.seal(value)?),
            None => Ok(value.to_string()),
        }
    }

    fn open(&self, stored: String) -> Result<String, StoreError> {
        match &self.encryption {
            Some(service) => Ok(service.open(&stored)?),
            None if EncryptionService::is_sealed(&stored) => {
                Err(EncryptionError::KeyNotConfigured.into())
            }
            None => Ok(stored),
        }
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn get(&self, user_id: &str) -> Result<Option<TokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT user_id, access_token, refresh_token, id_token, expires_at, scope
            FROM user_google_tokens
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            debug!(user_id = %user_id, "No Google token record found");
            return Ok(None);
        };

        Ok(Some(TokenRecord {
            user_id: row.user_id,
            access_token: self.open(row.access_token)?,
            refresh_token: self.open(row.refresh_token)?,
            id_token: row.id_token.map(|t| self.open(t)).transpose()?,
            expires_at: row.expires_at,
            scope: row.scope,
        }))
    }

    async fn upsert(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let access_token = self.seal(&record.access_token)?;
        let refresh_token = self.seal(&record.refresh_token)?;
        let id_token = record
            .id_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| self.seal(t))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO user_google_tokens
                (user_id, access_token, refresh_token, id_token, expires_at, scope, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, datetime('now'), datetime('now'))
            ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = CASE
                    WHEN excluded.refresh_token = '' THEN user_google_tokens.refresh_token
                    ELSE excluded.refresh_token
                END,
                id_token = COALESCE(excluded.id_token, user_google_tokens.id_token),
                expires_at = excluded.expires_at,
                scope = excluded.scope,
                updated_at = datetime('now')
            "#,
        )
        .bind(&record.user_id)
        .bind(&access_token)
        .bind(&refresh_token)
        .bind(id_token)
        .bind(record.expires_at)
        .bind(&record.scope)
        .execute(&self.pool)
        .await?;

        debug!(
            user_id = %record.user_id,
            expires_at = record.expires_at,
            "Google token record upserted"
        );
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM user_google_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Single-connection in-memory database with the real schema
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    crate::common::migrations::run_migrations(&pool).await.unwrap();
    pool
}

#[cfg(test)]
pub(crate) fn sample_record(user_id: &str, expires_at: i64) -> TokenRecord {
    TokenRecord {
        user_id: user_id.to_string(),
        access_token: "A1".to_string(),
        refresh_token: "R1".to_string(),
        id_token: None,
        expires_at,
        scope: "s".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_record() {
        let store = SqliteTokenStore::new(test_pool().await, None);
        assert_eq!(store.get("u404").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_then_get() {
        let store = SqliteTokenStore::new(test_pool().await, None);
        let record = sample_record("u1", 1_700_000_000);

        store.upsert(&record).await.unwrap();

        assert_eq!(store.get("u1").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_row_per_user() {
        let pool = test_pool().await;
        let store = SqliteTokenStore::new(pool.clone(), None);

        store.upsert(&sample_record("u1", 100)).await.unwrap();
        let mut updated = sample_record("u1", 200);
        updated.access_token = "A2".to_string();
        store.upsert(&updated).await.unwrap();

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM user_google_tokens WHERE user_id = 'u1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);

        let stored = store.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.access_token, "A2");
        assert_eq!(stored.expires_at, 200);
    }

    #[tokio::test]
    async fn test_empty_refresh_token_never_overwrites() {
        let store = SqliteTokenStore::new(test_pool().await, None);
        store.upsert(&sample_record("u1", 100)).await.unwrap();

        let mut without_refresh = sample_record("u1", 200);
        without_refresh.refresh_token = String::new();
        store.upsert(&without_refresh).await.unwrap();

        let stored = store.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.refresh_token, "R1");
        assert_eq!(stored.expires_at, 200);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SqliteTokenStore::new(test_pool().await, None);
        store.upsert(&sample_record("u1", 100)).await.unwrap();

        assert!(store.delete("u1").await.unwrap());
        assert!(!store.delete("u1").await.unwrap());
        assert_eq!(store.get("u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tokens_sealed_at_rest() {
        let pool = test_pool().await;
        let key = EncryptionService::generate_key();
        let store = SqliteTokenStore::new(pool.clone(), Some(EncryptionService::from_key(&key).unwrap()));

        let mut record = sample_record("u1", 100);
        record.access_token = "ya29.plaintext-access".to_string();
        store.upsert(&record).await.unwrap();

        let (raw,): (String,) =
            sqlx::query_as("SELECT access_token FROM user_google_tokens WHERE user_id = 'u1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(!raw.contains("plaintext"));
        assert_eq!(store.get("u1").await.unwrap().unwrap().access_token, "ya29.plaintext-access");

        // Reading sealed rows without the key is an error, not garbage
        let keyless = SqliteTokenStore::new(pool, None);
        assert!(matches!(
            keyless.get("u1").await,
            Err(StoreError::Encryption(EncryptionError::KeyNotConfigured))
        ));
    }
}
