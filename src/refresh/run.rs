use std::future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::model::StagedDocument;
use crate::pool::{CancelHandle, JobHandler, PoolReport, WorkerPool};
use crate::store::StagingStore;
use crate::window::SyncWindow;
use super::RelationRefresher;

/// Everything one refresh run needs besides the window.
pub struct RefreshContext {
    pub staging: Arc<dyn StagingStore>,
    pub staging_collection: String,
    pub refresher: Arc<RelationRefresher>,
    pub workers: usize,
    pub progress_every: usize,
    /// Stop taking new entities after this long
    pub run_timeout: Option<Duration>,
    /// Stop taking new entities on ctrl-c
    pub handle_interrupt: bool,
}

/// Refresh every entity staged inside `window` and report the totals.
///
/// Per-entity failures land in the report; only the staging query can fail the run.
pub async fn run_refresh(ctx: &RefreshContext, window: &SyncWindow) -> Result<PoolReport> {
    let started = Instant::now();
    let docs = ctx.staging.query_window(&ctx.staging_collection, window).await?;
    log::info!(
        "{} entities in {} for window {}",
        docs.len(),
        ctx.staging_collection,
        window
    );

    let handler: Arc<dyn JobHandler<StagedDocument>> = ctx.refresher.clone();
    let mut pool = WorkerPool::spawn(ctx.workers, ctx.progress_every, handler);

    let watchdog = (ctx.run_timeout.is_some() || ctx.handle_interrupt).then(|| {
        tokio::spawn(cancel_on_stop_signal(
            pool.cancel_handle(),
            ctx.run_timeout,
            ctx.handle_interrupt,
        ))
    });

    let total = docs.len();
    let mut queued = 0;
    for doc in docs {
        if let Err(e) = pool.submit(doc) {
            log::warn!("Stopped queueing after {} of {} entities: {}", queued, total, e);
            break;
        }
        queued += 1;
    }

    let mut report = pool.finish().await;
    report.abandoned += total - queued;
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }

    log::info!(
        "Refresh of {} done in {:.1}s: {} updated, {} skipped, {} failed, {} abandoned{}",
        window,
        started.elapsed().as_secs_f64(),
        report.updated,
        report.skipped,
        report.failed,
        report.abandoned,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    for label in &report.failures {
        log::warn!("Not updated: {}", label);
    }

    Ok(report)
}

async fn cancel_on_stop_signal(cancel: CancelHandle, timeout: Option<Duration>, interrupt: bool) {
    let deadline = async move {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let interrupted = async {
        if !interrupt {
            return future::pending::<()>().await;
        }
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Cannot listen for ctrl-c: {}", e);
            future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = &mut deadline => log::warn!("Run timeout reached, cancelling remaining entities"),
        _ = interrupted => log::warn!("Interrupted, cancelling remaining entities"),
    }
    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityDocument, RelationKind};
    use crate::refresh::tests::{fixture, staged, RejectingGraph, StubClassifier};
    use crate::refresh::{plan, RelationResolver};
    use crate::store::{GraphStore, SqliteStagingStore};
    use crate::window;
    use chrono::NaiveDate;
    use serde_json::{json, Map};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_refresh_counts_each_outcome() {
        let fx = fixture().await;
        let staging = SqliteStagingStore::new(fx.staging_db.clone());

        let names = ["甲公司", "乙公司", "丙公司", "丁公司"];
        for (i, name) in names.iter().enumerate() {
            let mut doc = staged(&format!("c{}", i), name, json!({}));
            doc.crawl_time = chrono::DateTime::parse_from_rfc3339("2020-05-01T10:00:00+08:00")
                .unwrap()
                .with_timezone(&chrono::Utc);
            staging.upsert("process_company", &doc).await.unwrap();
            // 丁公司 was never ingested
            if i < 3 {
                fx.graph
                    .insert("kb_company", &EntityDocument::new(format!("c{}", i), *name, Map::new()))
                    .await
                    .unwrap();
            }
        }

        let graph: Arc<dyn GraphStore> = Arc::new(RejectingGraph {
            inner: fx.graph.clone(),
            reject: "乙公司".to_string(),
        });
        let classifier = Arc::new(StubClassifier {
            answers: names.iter().map(|n| (n.to_string(), vec![5])).collect(),
        });
        let resolver = RelationResolver::new(
            fx.categories.clone(),
            fx.divisions.clone(),
            fx.schema.clone(),
            graph.clone(),
            "kb_company",
        )
        .with_classifier(classifier);
        let targets = plan(&[RelationKind::Industry], &[] as &[&str], &fx.categories).unwrap();

        let ctx = RefreshContext {
            staging: Arc::new(staging),
            staging_collection: "process_company".to_string(),
            refresher: Arc::new(RelationRefresher::new("kb_company", targets, resolver, graph)),
            workers: 4,
            progress_every: 100,
            run_timeout: Some(Duration::from_secs(60)),
            handle_interrupt: false,
        };

        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let window = window::resolve("2020-05-01", Some("2020-05-02"), today).unwrap();
        let report = run_refresh(&ctx, &window).await.unwrap();

        assert_eq!(report.submitted, 4);
        assert_eq!(report.updated, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures, vec!["乙公司 (c1)".to_string()]);
        assert!(!report.cancelled);

        let saved = fx.graph.get("kb_company", "c0").await.unwrap().unwrap();
        assert_eq!(saved.relations.len(), 3);

        let empty = window::resolve("2021-01-01", None, today).unwrap();
        let report = run_refresh(&ctx, &empty).await.unwrap();
        assert_eq!(report, PoolReport::default());
    }
}
