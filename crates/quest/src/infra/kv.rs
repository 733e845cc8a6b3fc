use async_trait::async_trait;
use log::debug;
use sqlx::Row;
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::infra::db::DBConnection;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("problem querying local storage: {0}")]
    Db(#[from] sqlx::Error),
    #[error("stored value under {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("local storage unavailable: {0}")]
    Unavailable(String),
}

/// String keyed persistence the completion store is built on.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn set(&self, key: &str, value: String) -> Result<(), KvError>;
    /// Write every entry in one step, either all land or none do.
    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), KvError>;
    /// Remove every key in one step, either all are gone or none are.
    async fn remove_many(&self, keys: &[&str]) -> Result<(), KvError>;
}

#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    db_connection: DBConnection,
}

impl SqliteKeyValueStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.db_connection.ping().await
    }
}

fn now_rfc3339() -> Result<String, KvError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| KvError::Unavailable(format!("failed to format timestamp: {}", e)))
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db_connection.read())
            .await?;

        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), KvError> {
        debug!("kv set {} ({} bytes)", key, value.len());
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now_rfc3339()?)
        .execute(self.db_connection.write())
        .await?;

        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), KvError> {
        let updated_at = now_rfc3339()?;
        let mut tx = self.db_connection.write().begin().await?;
        for (key, value) in entries {
            debug!("kv set {} ({} bytes)", key, value.len());
            sqlx::query(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(*key)
            .bind(value)
            .bind(&updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), KvError> {
        let mut tx = self.db_connection.write().begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM kv_store WHERE key = ?")
                .bind(*key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
