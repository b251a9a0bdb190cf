//! Staging → graph ingestion: create graph documents for newly staged entities.
//!
//! Existing documents are left alone; relations are filled in later by the refresh run.

use chrono::Timelike;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::model::{EntityDocument, StagedDocument};
use crate::store::{GraphStore, StagingStore};
use crate::window::SyncWindow;

const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub total: usize,
    pub inserted: usize,
    pub existing: usize,
    pub failed: usize,
}

/// Graph properties for a staged document: `dropped` keys removed and
/// `crawl_time` rendered as a UTC wall-clock string.
///
/// The format is the one existing graph documents carry:
/// `YYYY-MM-DD HH:MM:SS`, with `.ffffff` appended only when there is a fraction.
pub fn clean_properties(doc: &StagedDocument, dropped: &[String]) -> Map<String, Value> {
    let mut properties = doc.properties.clone();
    for key in dropped {
        properties.remove(key);
    }

    let format = if doc.crawl_time.nanosecond() / 1_000 == 0 {
        "%Y-%m-%d %H:%M:%S"
    } else {
        "%Y-%m-%d %H:%M:%S%.6f"
    };
    properties.insert(
        "crawl_time".to_string(),
        Value::String(doc.crawl_time.format(format).to_string()),
    );
    properties
}

/// Copy every document staged in `window` into `collection` unless its key already exists.
pub async fn ingest_window(
    staging: &dyn StagingStore,
    graph: &dyn GraphStore,
    staging_collection: &str,
    collection: &str,
    window: &SyncWindow,
    dropped: &[String],
) -> Result<IngestReport> {
    let docs = staging.query_window(staging_collection, window).await?;
    let mut report = IngestReport {
        total: docs.len(),
        ..Default::default()
    };
    log::info!("{} staged documents in {} for window {}", report.total, staging_collection, window);

    for (idx, staged) in docs.iter().enumerate() {
        match ingest_one(graph, collection, staged, dropped).await {
            Ok(true) => {
                log::debug!("Inserted [{}] into {}", staged.name, collection);
                report.inserted += 1;
            }
            Ok(false) => {
                log::debug!("[{}] ({}) already in {}", staged.name, staged.id, collection);
                report.existing += 1;
            }
            Err(e) => {
                log::error!("Failed to insert [{}] ({}): {}", staged.name, staged.id, e);
                report.failed += 1;
            }
        }

        let done = idx + 1;
        if done % PROGRESS_EVERY == 0 || done == report.total {
            log::info!("{}/{} staged documents processed", done, report.total);
        }
    }

    log::info!(
        "Ingest of {} into {} done: {} inserted, {} already present, {} failed",
        window,
        collection,
        report.inserted,
        report.existing,
        report.failed
    );
    Ok(report)
}

async fn ingest_one(
    graph: &dyn GraphStore,
    collection: &str,
    staged: &StagedDocument,
    dropped: &[String],
) -> Result<bool> {
    if graph.get(collection, &staged.id).await?.is_some() {
        return Ok(false);
    }
    let doc = EntityDocument::new(staged.id.clone(), staged.name.clone(), clean_properties(staged, dropped));
    graph.insert(collection, &doc).await
}
