//! State Store (§4.6): replication state keyed `(source_id, stream_name)`,
//! with a Postgres primary backend and a file-per-source JSON fallback
//! chosen automatically on database failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use elt_core::model::{CursorValue, SourceState, StreamState, SyncMode};
use sqlx::PgPool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Fields an `update_stream` call may change (§4.6). Absent fields leave
/// the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct StreamUpdate {
    pub cursor_field: Option<String>,
    pub cursor_value: Option<CursorValue>,
    pub sync_mode: Option<SyncMode>,
    pub records_synced_delta: i64,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct StateSummary {
    pub total_sources: usize,
    pub total_streams: usize,
    pub total_records_synced: i64,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, source_id: &str) -> Result<Option<SourceState>>;
    async fn create(&self, source_name: &str, source_id: &str, streams: &[String]) -> Result<SourceState>;
    async fn update_stream(&self, source_id: &str, stream: &str, update: StreamUpdate) -> Result<SourceState>;
    async fn get_cursor(&self, source_id: &str, stream: &str) -> Result<Option<CursorValue>>;
    async fn reset_stream(&self, source_id: &str, stream: &str) -> Result<()>;
    async fn reset_source(&self, source_id: &str) -> Result<()>;
    async fn delete(&self, source_id: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<SourceState>>;
    async fn export(&self, source_id: &str) -> Result<serde_json::Value>;
    async fn import(&self, source_id: &str, data: serde_json::Value) -> Result<()>;
    async fn summary(&self) -> Result<StateSummary>;
}

fn apply_update(state: &mut SourceState, stream: &str, update: StreamUpdate) {
    let entry = state
        .streams
        .entry(stream.to_string())
        .or_insert_with(|| StreamState::new(SyncMode::FullRefresh));

    if let Some(cursor_field) = update.cursor_field {
        entry.cursor_field = Some(cursor_field);
    }
    if let Some(cursor_value) = update.cursor_value {
        entry.cursor_value = Some(cursor_value);
    }
    if let Some(sync_mode) = update.sync_mode {
        entry.sync_mode = sync_mode;
    }
    entry.records_synced += update.records_synced_delta;
    if let Some(metadata) = update.metadata {
        entry.metadata = metadata;
    }
    entry.last_synced_at = Some(chrono::Utc::now());
    state.updated_at = chrono::Utc::now();
    state.version += 1;
}

fn summarize(sources: &HashMap<String, SourceState>) -> StateSummary {
    let mut summary = StateSummary {
        total_sources: sources.len(),
        ..Default::default()
    };
    for source in sources.values() {
        summary.total_streams += source.streams.len();
        summary.total_records_synced += source.streams.values().map(|s| s.records_synced).sum::<i64>();
    }
    summary
}

/// Postgres-backed store (§4.6 "primary backend"). Denormalized columns
/// cover the common read path; `state_data` carries the full struct so
/// nothing about a source's state is lossy across a round trip.
pub struct PgStateStore {
    pool: PgPool,
    cache: Arc<RwLock<HashMap<String, SourceState>>>,
}

impl PgStateStore {
    pub async fn connect(pool: PgPool) -> Result<Self> {
        ensure_table(&pool).await?;
        let cache = load_source_rows(&pool).await?;
        Ok(PgStateStore {
            pool,
            cache: Arc::new(RwLock::new(cache)),
        })
    }

    async fn persist(&self, state: &SourceState) -> Result<()> {
        // `stream_name = ''` is the source-level aggregate row (§4.6); it
        // carries the full `state_data` blob, with denormalized columns
        // summarizing rather than mirroring any single stream.
        let records_synced: i64 = state.streams.values().map(|s| s.records_synced).sum();
        let state_data = serde_json::to_value(state)?;

        sqlx::query(
            r#"
            INSERT INTO state_store (source_id, source_name, stream_name, sync_mode, state_data, records_synced, created_at, updated_at)
            VALUES ($1, $2, '', 'full_refresh', $3, $4, now(), now())
            ON CONFLICT (source_id, stream_name) DO UPDATE
              SET source_name = excluded.source_name,
                  state_data = excluded.state_data,
                  records_synced = excluded.records_synced,
                  updated_at = now()
            "#,
        )
        .bind(&state.source_id)
        .bind(&state.source_name)
        .bind(&state_data)
        .bind(records_synced)
        .execute(&self.pool)
        .await
        .context("state_store upsert failed")?;

        for (stream_name, stream) in &state.streams {
            if stream_name.is_empty() {
                continue;
            }
            let cursor_value = stream
                .cursor_value
                .as_ref()
                .map(|c| serde_json::to_value(c).unwrap_or(serde_json::Value::Null).to_string());
            let sync_mode = match stream.sync_mode {
                SyncMode::FullRefresh => "full_refresh",
                SyncMode::Incremental => "incremental",
            };
            let stream_data = serde_json::to_value(stream)?;

            sqlx::query(
                r#"
                INSERT INTO state_store (source_id, source_name, stream_name, cursor_field, cursor_value, sync_mode, state_data, last_synced_at, records_synced, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now())
                ON CONFLICT (source_id, stream_name) DO UPDATE
                  SET cursor_field = excluded.cursor_field,
                      cursor_value = excluded.cursor_value,
                      sync_mode = excluded.sync_mode,
                      state_data = excluded.state_data,
                      last_synced_at = excluded.last_synced_at,
                      records_synced = excluded.records_synced,
                      updated_at = now()
                "#,
            )
            .bind(&state.source_id)
            .bind(&state.source_name)
            .bind(stream_name)
            .bind(&stream.cursor_field)
            .bind(cursor_value)
            .bind(sync_mode)
            .bind(&stream_data)
            .bind(stream.last_synced_at)
            .bind(stream.records_synced)
            .execute(&self.pool)
            .await
            .context("state_store stream upsert failed")?;
        }

        Ok(())
    }
}

async fn ensure_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS state_store (
            id SERIAL PRIMARY KEY,
            source_id TEXT NOT NULL,
            source_name TEXT,
            stream_name TEXT NOT NULL,
            cursor_field TEXT,
            cursor_value TEXT,
            sync_mode TEXT DEFAULT 'full_refresh',
            state_data JSON NOT NULL,
            last_synced_at TIMESTAMP,
            records_synced INTEGER DEFAULT 0,
            created_at TIMESTAMP,
            updated_at TIMESTAMP,
            UNIQUE(source_id, stream_name)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create state_store table failed")?;
    Ok(())
}

async fn load_source_rows(pool: &PgPool) -> Result<HashMap<String, SourceState>> {
    let rows: Vec<(String, serde_json::Value)> = sqlx::query_as(
        "SELECT source_id, state_data FROM state_store WHERE stream_name = ''",
    )
    .fetch_all(pool)
    .await
    .context("state_store source-row load failed")?;

    let mut cache = HashMap::new();
    for (source_id, state_data) in rows {
        if let Ok(state) = serde_json::from_value::<SourceState>(state_data) {
            cache.insert(source_id, state);
        }
    }
    Ok(cache)
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn get(&self, source_id: &str) -> Result<Option<SourceState>> {
        let cache = self.cache.read().await;
        Ok(cache.get(source_id).cloned())
    }

    async fn create(&self, source_name: &str, source_id: &str, streams: &[String]) -> Result<SourceState> {
        let mut state = SourceState::new(source_name, source_id);
        for stream in streams {
            state.streams.insert(stream.clone(), StreamState::new(SyncMode::FullRefresh));
        }
        self.persist(&state).await?;
        self.cache.write().await.insert(source_id.to_string(), state.clone());
        Ok(state)
    }

    async fn update_stream(&self, source_id: &str, stream: &str, update: StreamUpdate) -> Result<SourceState> {
        let mut cache = self.cache.write().await;
        let state = cache
            .entry(source_id.to_string())
            .or_insert_with(|| SourceState::new(source_id, source_id));
        apply_update(state, stream, update);
        let snapshot = state.clone();
        drop(cache);
        self.persist(&snapshot).await?;
        Ok(snapshot)
    }

    async fn get_cursor(&self, source_id: &str, stream: &str) -> Result<Option<CursorValue>> {
        let cache = self.cache.read().await;
        Ok(cache
            .get(source_id)
            .and_then(|s| s.streams.get(stream))
            .and_then(|s| s.cursor_value.clone()))
    }

    async fn reset_stream(&self, source_id: &str, stream: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        if let Some(state) = cache.get_mut(source_id) {
            state.streams.remove(stream);
            state.version += 1;
            let snapshot = state.clone();
            drop(cache);
            self.persist(&snapshot).await?;
        }
        Ok(())
    }

    async fn reset_source(&self, source_id: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        if let Some(state) = cache.get_mut(source_id) {
            state.streams.clear();
            state.version += 1;
            let snapshot = state.clone();
            drop(cache);
            self.persist(&snapshot).await?;
        }
        Ok(())
    }

    async fn delete(&self, source_id: &str) -> Result<()> {
        self.cache.write().await.remove(source_id);
        sqlx::query("DELETE FROM state_store WHERE source_id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await
            .context("state_store delete failed")?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SourceState>> {
        Ok(self.cache.read().await.values().cloned().collect())
    }

    async fn export(&self, source_id: &str) -> Result<serde_json::Value> {
        let state = self.get(source_id).await?.context("source not found")?;
        Ok(serde_json::to_value(state)?)
    }

    async fn import(&self, source_id: &str, data: serde_json::Value) -> Result<()> {
        let state: SourceState = serde_json::from_value(data).context("invalid state payload")?;
        self.persist(&state).await?;
        self.cache.write().await.insert(source_id.to_string(), state);
        Ok(())
    }

    async fn summary(&self) -> Result<StateSummary> {
        Ok(summarize(&*self.cache.read().await))
    }
}

/// File-per-source JSON store (§4.6 "secondary backend"), used automatically
/// when the database backend fails to connect.
pub struct FileStateStore {
    base_dir: PathBuf,
    cache: Arc<RwLock<HashMap<String, SourceState>>>,
}

impl FileStateStore {
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir)
            .await
            .context("create state store directory failed")?;

        let mut cache = HashMap::new();
        let mut entries = tokio::fs::read_dir(&base_dir)
            .await
            .context("read state store directory failed")?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            if let Ok(state) = serde_json::from_slice::<SourceState>(&bytes) {
                cache.insert(state.source_id.clone(), state);
            }
        }

        Ok(FileStateStore {
            base_dir,
            cache: Arc::new(RwLock::new(cache)),
        })
    }

    fn path_for(&self, source_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", crate::ident::sanitize_column(source_id)))
    }

    async fn persist(&self, state: &SourceState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(self.path_for(&state.source_id), bytes)
            .await
            .context("write state store file failed")?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, source_id: &str) -> Result<Option<SourceState>> {
        Ok(self.cache.read().await.get(source_id).cloned())
    }

    async fn create(&self, source_name: &str, source_id: &str, streams: &[String]) -> Result<SourceState> {
        let mut state = SourceState::new(source_name, source_id);
        for stream in streams {
            state.streams.insert(stream.clone(), StreamState::new(SyncMode::FullRefresh));
        }
        self.persist(&state).await?;
        self.cache.write().await.insert(source_id.to_string(), state.clone());
        Ok(state)
    }

    async fn update_stream(&self, source_id: &str, stream: &str, update: StreamUpdate) -> Result<SourceState> {
        let mut cache = self.cache.write().await;
        let state = cache
            .entry(source_id.to_string())
            .or_insert_with(|| SourceState::new(source_id, source_id));
        apply_update(state, stream, update);
        let snapshot = state.clone();
        drop(cache);
        self.persist(&snapshot).await?;
        Ok(snapshot)
    }

    async fn get_cursor(&self, source_id: &str, stream: &str) -> Result<Option<CursorValue>> {
        Ok(self
            .cache
            .read()
            .await
            .get(source_id)
            .and_then(|s| s.streams.get(stream))
            .and_then(|s| s.cursor_value.clone()))
    }

    async fn reset_stream(&self, source_id: &str, stream: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        if let Some(state) = cache.get_mut(source_id) {
            state.streams.remove(stream);
            state.version += 1;
            let snapshot = state.clone();
            drop(cache);
            self.persist(&snapshot).await?;
        }
        Ok(())
    }

    async fn reset_source(&self, source_id: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        if let Some(state) = cache.get_mut(source_id) {
            state.streams.clear();
            state.version += 1;
            let snapshot = state.clone();
            drop(cache);
            self.persist(&snapshot).await?;
        }
        Ok(())
    }

    async fn delete(&self, source_id: &str) -> Result<()> {
        self.cache.write().await.remove(source_id);
        let path = self.path_for(source_id);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::remove_file(&path).await.context("remove state store file failed")?;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SourceState>> {
        Ok(self.cache.read().await.values().cloned().collect())
    }

    async fn export(&self, source_id: &str) -> Result<serde_json::Value> {
        let state = self.get(source_id).await?.context("source not found")?;
        Ok(serde_json::to_value(state)?)
    }

    async fn import(&self, source_id: &str, data: serde_json::Value) -> Result<()> {
        let state: SourceState = serde_json::from_value(data).context("invalid state payload")?;
        self.persist(&state).await?;
        self.cache.write().await.insert(source_id.to_string(), state);
        Ok(())
    }

    async fn summary(&self) -> Result<StateSummary> {
        Ok(summarize(&*self.cache.read().await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_roundtrips_create_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();
        store.create("orders-src", "src-1", &["orders".to_string()]).await.unwrap();

        let state = store.get("src-1").await.unwrap().unwrap();
        assert_eq!(state.source_name, "orders-src");
        assert!(state.streams.contains_key("orders"));
    }

    #[tokio::test]
    async fn update_stream_increments_version_and_records_synced() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();
        store.create("orders-src", "src-1", &["orders".to_string()]).await.unwrap();

        let state = store
            .update_stream(
                "src-1",
                "orders",
                StreamUpdate {
                    cursor_field: Some("updated_at".to_string()),
                    cursor_value: Some(CursorValue::Int(42)),
                    records_synced_delta: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(state.version, 1);
        assert_eq!(state.streams["orders"].records_synced, 10);
        assert_eq!(state.streams["orders"].cursor_value, Some(CursorValue::Int(42)));
    }

    #[tokio::test]
    async fn reopening_reloads_persisted_sources() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStateStore::open(dir.path()).await.unwrap();
            store.create("orders-src", "src-1", &[]).await.unwrap();
        }
        let store = FileStateStore::open(dir.path()).await.unwrap();
        assert!(store.get("src-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn summary_aggregates_across_sources() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();
        store.create("a-src", "a", &["s1".to_string()]).await.unwrap();
        store.create("b-src", "b", &["s1".to_string(), "s2".to_string()]).await.unwrap();
        store
            .update_stream("a", "s1", StreamUpdate { records_synced_delta: 5, ..Default::default() })
            .await
            .unwrap();

        let summary = store.summary().await.unwrap();
        assert_eq!(summary.total_sources, 2);
        assert_eq!(summary.total_streams, 3);
        assert_eq!(summary.total_records_synced, 5);
    }
}
