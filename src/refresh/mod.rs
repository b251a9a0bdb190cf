//! Relation refresh: per-entity fetch, reconcile and save, driven by the worker pool.

mod resolver;
mod run;

pub use resolver::RelationResolver;
pub use run::{run_refresh, RefreshContext};

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::error::{KbsyncError, Result};
use crate::model::{RelationEdge, RelationKind, StagedDocument};
use crate::pool::{JobHandler, JobOutcome};
use crate::reconcile::reconcile_with_stats;
use crate::schema::{CategoryIndex, RefreshScope};
use crate::store::GraphStore;

/// One relation kind to recompute and which of its edges are replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTarget {
    pub kind: RelationKind,
    pub scope: RefreshScope,
}

/// Targets for a run. Only industry edges are refreshed selectively; other
/// kinds are recomputed whole.
pub fn plan<S: AsRef<str>>(
    kinds: &[RelationKind],
    industries: &[S],
    categories: &CategoryIndex,
) -> Result<Vec<RefreshTarget>> {
    kinds
        .iter()
        .map(|kind| {
            let scope = match kind {
                RelationKind::Industry => categories.refresh_scope(industries)?,
                _ => RefreshScope::All,
            };
            Ok(RefreshTarget { kind: kind.clone(), scope })
        })
        .collect()
}

/// Job handler that rewrites the relations of one graph document.
pub struct RelationRefresher {
    collection: String,
    targets: Vec<RefreshTarget>,
    resolver: RelationResolver,
    graph: Arc<dyn GraphStore>,
}

impl RelationRefresher {
    pub fn new(
        collection: impl Into<String>,
        targets: Vec<RefreshTarget>,
        resolver: RelationResolver,
        graph: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            collection: collection.into(),
            targets,
            resolver,
            graph,
        }
    }

    async fn refresh(&self, staged: &StagedDocument) -> Result<JobOutcome> {
        let mut fresh: Vec<Vec<RelationEdge>> = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            fresh.push(self.resolver.resolve(&target.kind, staged).await?);
        }

        let Some(mut doc) = self.graph.get(&self.collection, &staged.id).await? else {
            log::debug!("[{}] not in {} yet, skipping", staged.name, self.collection);
            return Ok(JobOutcome::Skipped);
        };

        for (target, edges) in self.targets.iter().zip(&fresh) {
            let (relations, stats) = reconcile_with_stats(&doc.relations, edges, &target.kind, &target.scope);
            log::debug!(
                "[{}] {}: removed {}, kept {}, added {}",
                staged.name,
                target.kind,
                stats.removed,
                stats.kept,
                stats.added
            );
            doc.relations = relations;
        }

        doc.update_time = Utc::now();
        self.graph.put(&self.collection, &doc).await?;
        Ok(JobOutcome::Updated)
    }
}

#[async_trait]
impl JobHandler<StagedDocument> for RelationRefresher {
    async fn handle(&self, job: &StagedDocument) -> Result<JobOutcome> {
        self.refresh(job).await.map_err(|e| match e {
            failed @ KbsyncError::EntityUpdateFailed { .. } => failed,
            other => KbsyncError::EntityUpdateFailed {
                name: job.name.clone(),
                reason: other.to_string(),
            },
        })
    }

    fn label(&self, job: &StagedDocument) -> String {
        format!("{} ({})", job.name, job.id)
    }
}
