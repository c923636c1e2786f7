/// Persistence collaborators
///
/// Two narrow seams keep the runtime storage-agnostic: `SnapshotStore` for
/// actor context snapshots and `ModuleResolver` for module delegate graphs.
/// `SqliteStore` is the durable implementation; `MemoryStore` backs tests
/// and ephemeral module instances.

use crate::graph::types::GraphRecord;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Keyed actor snapshot storage
///
/// Keys are node ids for live actors and `{execution_id}:{node_id}` for
/// run-scoped replicas. Writes are best-effort from the actor's point of
/// view; errors surface here and are logged by the caller.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self, key: &str) -> anyhow::Result<Option<Value>>;
    async fn save(&self, key: &str, blob: Value) -> anyhow::Result<()>;
}

/// Lookup of module delegate graph definitions by module id
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    async fn resolve(&self, module_id: &str) -> anyhow::Result<Option<GraphRecord>>;
}

/// In-memory store for tests and ephemeral module instances
#[derive(Default)]
pub struct MemoryStore {
    snapshots: Mutex<HashMap<String, Value>>,
    modules: Mutex<HashMap<String, GraphRecord>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshot writes observed (used to verify debouncing)
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn insert_module(&self, module_id: impl Into<String>, record: GraphRecord) {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module_id.into(), record);
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self
            .snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn save(&self, key: &str, blob: Value) -> anyhow::Result<()> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), blob);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ModuleResolver for MemoryStore {
    async fn resolve(&self, module_id: &str) -> anyhow::Result<Option<GraphRecord>> {
        Ok(self
            .modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module_id)
            .cloned())
    }
}

/// SQLite-backed durable store
///
/// One row per snapshot key, upserted on save; module definitions live in
/// their own table and are written by whatever authoring collaborator saves
/// graphs.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and ensure the schema exists
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .with_context(|| format!("connecting to {database_url}"))?;
        let store = Self { pool };
        store.init_schema().await?;
        tracing::info!("sqlite store ready at {}", database_url);
        Ok(store)
    }

    async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS actor_snapshots (
                key        TEXT PRIMARY KEY,
                context    TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("creating actor_snapshots table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS module_graphs (
                id         TEXT PRIMARY KEY,
                definition TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("creating module_graphs table")?;
        Ok(())
    }

    /// Store or replace a module delegate graph definition
    pub async fn save_module(&self, module_id: &str, record: &GraphRecord) -> anyhow::Result<()> {
        let definition = serde_json::to_string(record).context("serializing module graph")?;
        sqlx::query(
            r#"
            INSERT INTO module_graphs (id, definition)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET definition = excluded.definition
            "#,
        )
        .bind(module_id)
        .bind(definition)
        .execute(&self.pool)
        .await
        .with_context(|| format!("saving module '{module_id}'"))?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn load(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let row = sqlx::query("SELECT context FROM actor_snapshots WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("loading snapshot '{key}'"))?;
        match row {
            Some(row) => {
                let text: String = row.get("context");
                let blob = serde_json::from_str(&text)
                    .with_context(|| format!("decoding snapshot '{key}'"))?;
                Ok(Some(blob))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, blob: Value) -> anyhow::Result<()> {
        let text = serde_json::to_string(&blob).context("serializing snapshot")?;
        sqlx::query(
            r#"
            INSERT INTO actor_snapshots (key, context, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                context = excluded.context,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(text)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("saving snapshot '{key}'"))?;
        Ok(())
    }
}

#[async_trait]
impl ModuleResolver for SqliteStore {
    async fn resolve(&self, module_id: &str) -> anyhow::Result<Option<GraphRecord>> {
        let row = sqlx::query("SELECT definition FROM module_graphs WHERE id = ?1")
            .bind(module_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("resolving module '{module_id}'"))?;
        match row {
            Some(row) => {
                let text: String = row.get("definition");
                let record = serde_json::from_str(&text)
                    .with_context(|| format!("decoding module '{module_id}'"))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_round_trips_snapshots() {
        let store = MemoryStore::new();
        assert!(store.load("n1").await.unwrap().is_none());
        store.save("n1", json!({"status": "idle"})).await.unwrap();
        let blob = store.load("n1").await.unwrap().unwrap();
        assert_eq!(blob["status"], "idle");
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn memory_store_resolves_inserted_modules() {
        let store = MemoryStore::new();
        assert!(store.resolve("math").await.unwrap().is_none());
        store.insert_module("math", GraphRecord::default());
        assert!(store.resolve("math").await.unwrap().is_some());
    }
}
