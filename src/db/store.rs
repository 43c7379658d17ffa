use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use fhir_sync_core::{
    LocalChange, LocalChangeStore, LocalChangeToken, LocalChangeType, ResourceType, StoreError,
};
use sqlx::SqlitePool;

/// SQLite-backed local store: pending changes and downloaded resources.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

// Row types for database queries
#[derive(sqlx::FromRow)]
struct LocalChangeRow {
    token: i64,
    resource_type: String,
    resource_id: String,
    change_type: String,
    payload: String,
    created_at: String,
}

impl LocalChangeRow {
    fn into_change(self) -> Result<(LocalChangeToken, LocalChange), StoreError> {
        let resource_type = ResourceType::new(self.resource_type)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let change_type: LocalChangeType = self
            .change_type
            .parse()
            .map_err(StoreError::Serialization)?;
        let timestamp = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok((
            LocalChangeToken(self.token),
            LocalChange {
                resource_type,
                resource_id: self.resource_id,
                change_type,
                payload: self.payload,
                timestamp,
            },
        ))
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Queues a local change for the next upload
    pub async fn add_local_change(
        &self,
        change: &LocalChange,
    ) -> Result<LocalChangeToken, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO local_changes (resource_type, resource_id, change_type, payload, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(change.resource_type.as_str())
        .bind(&change.resource_id)
        .bind(change.change_type.to_string())
        .bind(&change.payload)
        .bind(change.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(LocalChangeToken(result.last_insert_rowid()))
    }

    /// Number of downloaded resources of a type
    pub async fn count_resources(&self, resource_type: &ResourceType) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM resources WHERE resource_type = ?")
                .bind(resource_type.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[async_trait]
impl LocalChangeStore for SqliteStore {
    async fn get_all_local_changes(
        &self,
    ) -> Result<Vec<(LocalChangeToken, LocalChange)>, StoreError> {
        let rows: Vec<LocalChangeRow> =
            sqlx::query_as("SELECT * FROM local_changes ORDER BY token")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        rows.into_iter().map(LocalChangeRow::into_change).collect()
    }

    async fn delete_local_changes(&self, tokens: &[LocalChangeToken]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for token in tokens {
            sqlx::query("DELETE FROM local_changes WHERE token = ?")
                .bind(token.0)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }

    async fn save_remote_resources(
        &self,
        resource_type: &ResourceType,
        resources: Vec<serde_json::Value>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for resource in &resources {
            let Some(id) = resource.get("id").and_then(|v| v.as_str()) else {
                tracing::warn!("Skipping {} resource without an id", resource_type);
                continue;
            };
            let last_updated = resource
                .pointer("/meta/lastUpdated")
                .and_then(|v| v.as_str())
                .and_then(normalize_instant);
            let payload = serde_json::to_string(resource)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO resources (resource_type, resource_id, payload, last_updated)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (resource_type, resource_id)
                DO UPDATE SET payload = excluded.payload, last_updated = excluded.last_updated
                "#,
            )
            .bind(resource_type.as_str())
            .bind(id)
            .bind(&payload)
            .bind(last_updated)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }

    async fn last_updated(
        &self,
        resource_type: &ResourceType,
    ) -> Result<Option<String>, StoreError> {
        let (marker,): (Option<String>,) =
            sqlx::query_as("SELECT MAX(last_updated) FROM resources WHERE resource_type = ?")
                .bind(resource_type.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(marker)
    }
}

/// Rewrites a FHIR instant as fixed-width UTC so markers compare correctly
/// as text.
fn normalize_instant(raw: &str) -> Option<String> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(instant) => Some(
            instant
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        ),
        Err(e) => {
            tracing::warn!("Ignoring unparseable meta.lastUpdated {:?}: {}", raw, e);
            None
        }
    }
}
