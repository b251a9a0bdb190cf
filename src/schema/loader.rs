//! Reads the flat relational schema tables.

use rusqlite::params;

use crate::db::Db;
use crate::error::{KbsyncError, Result};
use crate::model::{RelationEdge, RelationKind};
use super::category::CategoryNode;
use super::division::DivisionNode;

/// Relational schema store: category and division tables plus company channels.
#[derive(Debug, Clone)]
pub struct SchemaStore {
    db: Db,
}

impl SchemaStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn load_categories(&self) -> Result<Vec<CategoryNode>> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT id, name, parent_id FROM res_industry ORDER BY id")?;
                let rows = stmt.query_map([], |row| {
                    Ok(CategoryNode {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        // 0 marks a root in some exports
                        parent_id: row.get::<_, Option<i64>>(2)?.filter(|p| *p != 0),
                    })
                })?;
                let nodes = rows.collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok::<_, KbsyncError>(nodes)
            })
            .await
    }

    pub async fn load_divisions(&self) -> Result<Vec<DivisionNode>> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT name, id, level, parent_id FROM res_division ORDER BY id")?;
                let rows = stmt.query_map([], |row| {
                    Ok(DivisionNode {
                        name: row.get(0)?,
                        id: row.get(1)?,
                        level: row.get(2)?,
                        parent_id: row.get(3)?,
                    })
                })?;
                let nodes = rows.collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok::<_, KbsyncError>(nodes)
            })
            .await
    }

    /// Channel edges for a company, by exact company name.
    pub async fn channels_for(&self, company_name: &str) -> Result<Vec<RelationEdge>> {
        let company_name = company_name.to_string();
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT channel_name, channel_id FROM company_channel \
                     WHERE company_name = ?1 ORDER BY channel_id",
                )?;
                let rows = stmt.query_map(params![company_name], |row| {
                    let name: String = row.get(0)?;
                    let id: i64 = row.get(1)?;
                    Ok(RelationEdge::new(RelationKind::Channel, name, id))
                })?;
                let edges = rows.collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok::<_, KbsyncError>(edges)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectId;
    use std::path::Path;
    use tempfile::TempDir;

    async fn setup_schema_db() -> (SchemaStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("schema.db"));
        db.migrate(&Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
            .await
            .unwrap();
        db.with_connection(|conn| {
            conn.execute_batch(
                "INSERT INTO res_industry (id, name, parent_id) VALUES
                    (1, '医疗健康', 0), (2, '生物医药', 1), (5, '生物制药', 2);
                 INSERT INTO res_division (id, name, level, parent_id) VALUES
                    (110000, '北京', 1, NULL), (110108, '海淀区', 3, 110000);
                 INSERT INTO company_channel (company_name, channel_name, channel_id) VALUES
                    ('示例科技有限公司', '中关村科技园', 9),
                    ('示例科技有限公司', '海淀创业园', 4),
                    ('别的公司', '中关村科技园', 9);",
            )?;
            Ok(())
        })
        .await
        .unwrap();
        (SchemaStore::new(db), temp_dir)
    }

    #[tokio::test]
    async fn test_load_categories_treats_zero_parent_as_root() {
        let (store, _temp_dir) = setup_schema_db().await;
        let nodes = store.load_categories().await.unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].parent_id, None);
        assert_eq!(nodes[2].parent_id, Some(2));
    }

    #[tokio::test]
    async fn test_load_divisions() {
        let (store, _temp_dir) = setup_schema_db().await;
        let nodes = store.load_divisions().await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].parent_id, Some(110000));
    }

    #[tokio::test]
    async fn test_channels_for_company() {
        let (store, _temp_dir) = setup_schema_db().await;
        let edges = store.channels_for("示例科技有限公司").await.unwrap();
        let ids: Vec<_> = edges.iter().map(|e| e.object_id.clone()).collect();
        assert_eq!(ids, vec![ObjectId::Int(4), ObjectId::Int(9)]);
        assert_eq!(edges[0].object_type, "channel");
        assert!(store.channels_for("无渠道公司").await.unwrap().is_empty());
    }
}
