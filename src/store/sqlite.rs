use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::{Map, Value};

use crate::db::Db;
use crate::error::{KbsyncError, Result};
use crate::model::{EntityDocument, StagedDocument};
use crate::window::SyncWindow;
use super::{GraphStore, StagingStore};

/// Staging documents in the `staging_documents` table; `crawl_time` is unix millis.
#[derive(Debug, Clone)]
pub struct SqliteStagingStore {
    db: Db,
}

impl SqliteStagingStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Add or replace a staged document.
    pub async fn upsert(&self, collection: &str, doc: &StagedDocument) -> Result<()> {
        let collection = collection.to_string();
        let id = doc.id.clone();
        let name = doc.name.clone();
        let properties = serde_json::to_string(&doc.properties)?;
        let crawl_time = doc.crawl_time.timestamp_millis();

        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO staging_documents (collection, doc_id, name, properties_json, crawl_time) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(collection, doc_id) DO UPDATE SET \
                        name = excluded.name, \
                        properties_json = excluded.properties_json, \
                        crawl_time = excluded.crawl_time",
                    params![collection, id, name, properties, crawl_time],
                )?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl StagingStore for SqliteStagingStore {
    async fn query_window(&self, collection: &str, window: &SyncWindow) -> Result<Vec<StagedDocument>> {
        let collection = collection.to_string();
        let (start, end) = window.as_millis();

        let rows: Vec<(String, String, String, i64)> = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT doc_id, name, properties_json, crawl_time FROM staging_documents \
                     WHERE collection = ?1 AND crawl_time >= ?2 AND (?3 IS NULL OR crawl_time < ?3) \
                     ORDER BY doc_id",
                )?;
                let rows = stmt
                    .query_map(params![collection, start, end], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok::<_, KbsyncError>(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, name, properties, crawl_time)| -> Result<StagedDocument> {
                let properties: Map<String, Value> = serde_json::from_str(&properties)?;
                let crawl_time = Utc
                    .timestamp_millis_opt(crawl_time)
                    .single()
                    .ok_or_else(|| KbsyncError::InvalidInput(format!("bad crawl_time for {}", id)))?;
                Ok(StagedDocument { id, name, properties, crawl_time })
            })
            .collect()
    }
}

/// Graph documents as JSON bodies in `graph_documents`, keyed by `(collection, _key)`.
#[derive(Debug, Clone)]
pub struct SqliteGraphStore {
    db: Db,
}

impl SqliteGraphStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn fetch_one(&self, sql: &'static str, collection: &str, value: &str) -> Result<Option<EntityDocument>> {
        let collection = collection.to_string();
        let value = value.to_string();

        let body: Option<String> = self
            .db
            .with_connection(move |conn| {
                let body = conn
                    .query_row(sql, params![collection, value], |row| row.get(0))
                    .optional()?;
                Ok::<_, KbsyncError>(body)
            })
            .await?;

        body.map(|b| serde_json::from_str(&b).map_err(KbsyncError::from))
            .transpose()
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<EntityDocument>> {
        self.fetch_one(
            "SELECT body_json FROM graph_documents WHERE collection = ?1 AND doc_key = ?2",
            collection,
            key,
        )
        .await
    }

    async fn put(&self, collection: &str, doc: &EntityDocument) -> Result<()> {
        let collection = collection.to_string();
        let key = doc.key.clone();
        let name = doc.name.clone();
        let body = serde_json::to_string(doc)?;

        let updated = self
            .db
            .with_connection({
                let key = key.clone();
                move |conn| {
                    let n = conn.execute(
                        "UPDATE graph_documents SET name = ?3, body_json = ?4 \
                         WHERE collection = ?1 AND doc_key = ?2",
                        params![collection, key, name, body],
                    )?;
                    Ok(n)
                }
            })
            .await?;

        if updated == 0 {
            return Err(KbsyncError::DocumentNotFound(key));
        }
        Ok(())
    }

    async fn insert(&self, collection: &str, doc: &EntityDocument) -> Result<bool> {
        let collection = collection.to_string();
        let key = doc.key.clone();
        let name = doc.name.clone();
        let body = serde_json::to_string(doc)?;

        self.db
            .with_connection(move |conn| {
                let n = conn.execute(
                    "INSERT OR IGNORE INTO graph_documents (collection, doc_key, name, body_json) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![collection, key, name, body],
                )?;
                Ok(n == 1)
            })
            .await
    }

    async fn find_by_name(&self, collection: &str, name: &str) -> Result<Option<EntityDocument>> {
        self.fetch_one(
            "SELECT body_json FROM graph_documents WHERE collection = ?1 AND name = ?2 \
             ORDER BY doc_key LIMIT 1",
            collection,
            name,
        )
        .await
    }
}
