//! Selective replacement of an entity's relation edges.
//!
//! Only edges of the refreshed kind whose own `object_id` is in the refresh scope
//! are dropped; everything else is kept as stored and in stored order. Fresh edges
//! are appended after, unless an edge with the same `(relation_type, object_id)`
//! survived, in which case the stored copy is kept.

use std::collections::HashSet;

use crate::model::{ObjectId, RelationEdge, RelationKind};
use crate::schema::RefreshScope;

/// Counts describing one reconcile step, for debug logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub removed: usize,
    pub kept: usize,
    pub added: usize,
}

/// Build the new relation set for `kind`. See the module docs for the rules.
pub fn reconcile(
    existing: &[RelationEdge],
    fresh: &[RelationEdge],
    kind: &RelationKind,
    scope: &RefreshScope,
) -> Vec<RelationEdge> {
    reconcile_with_stats(existing, fresh, kind, scope).0
}

pub fn reconcile_with_stats(
    existing: &[RelationEdge],
    fresh: &[RelationEdge],
    kind: &RelationKind,
    scope: &RefreshScope,
) -> (Vec<RelationEdge>, ReconcileStats) {
    let mut stats = ReconcileStats::default();
    let mut seen: HashSet<(RelationKind, ObjectId)> = HashSet::new();
    let mut result = Vec::with_capacity(existing.len() + fresh.len());

    for edge in existing {
        if &edge.relation_type == kind && scope.contains(&edge.object_id) {
            stats.removed += 1;
            continue;
        }
        if seen.insert(identity(edge)) {
            stats.kept += 1;
            result.push(edge.clone());
        }
    }

    for edge in fresh.iter().filter(|e| &e.relation_type == kind) {
        if seen.insert(identity(edge)) {
            stats.added += 1;
            result.push(edge.clone());
        }
    }

    (result, stats)
}

fn identity(edge: &RelationEdge) -> (RelationKind, ObjectId) {
    let (kind, id) = edge.identity();
    (kind.clone(), id.clone())
}
