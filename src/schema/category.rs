//! Industry category forest loaded from the flat `res_industry` table.

use std::collections::{HashMap, HashSet};

use crate::error::{KbsyncError, Result};
use crate::model::{ObjectId, RelationEdge, RelationKind};

pub type CategoryId = i64;

/// One row of the category table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNode {
    pub id: CategoryId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
}

/// Which edges of a relation kind a run replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshScope {
    /// Every edge of the refreshed kind
    All,
    /// Edges whose own id is in the set
    Ids(HashSet<CategoryId>),
}

impl RefreshScope {
    pub fn contains(&self, id: &ObjectId) -> bool {
        match (self, id) {
            (RefreshScope::All, _) => true,
            (RefreshScope::Ids(ids), ObjectId::Int(id)) => ids.contains(id),
            (RefreshScope::Ids(ids), ObjectId::Str(id)) => {
                id.parse::<CategoryId>().map(|id| ids.contains(&id)).unwrap_or(false)
            }
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            RefreshScope::All => None,
            RefreshScope::Ids(ids) => Some(ids.len()),
        }
    }
}

/// Read-only id → node map with ancestor-chain queries. Built once per run.
#[derive(Debug, Default)]
pub struct CategoryIndex {
    nodes: HashMap<CategoryId, CategoryNode>,
}

impl CategoryIndex {
    /// Build the index and reject parent loops up front.
    pub fn build(rows: impl IntoIterator<Item = CategoryNode>) -> Result<Self> {
        let index = Self {
            nodes: rows.into_iter().map(|node| (node.id, node)).collect(),
        };
        for id in index.nodes.keys() {
            index.resolve_chain(*id)?;
        }
        log::info!("Category index loaded: {} nodes", index.nodes.len());
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: CategoryId) -> Option<&CategoryNode> {
        self.nodes.get(&id)
    }

    /// `id` followed by its parent, grandparent, … up to the root.
    ///
    /// An unknown `id` gives an empty chain; a parent id missing from the table
    /// ends the chain there. More hops than there are nodes means a loop.
    pub fn resolve_chain(&self, id: CategoryId) -> Result<Vec<&CategoryNode>> {
        let mut chain = Vec::new();
        let mut next = self.nodes.get(&id);

        while let Some(node) = next {
            if chain.len() == self.nodes.len() {
                return Err(KbsyncError::HierarchyCycle(id));
            }
            chain.push(node);
            next = node.parent_id.and_then(|parent| self.nodes.get(&parent));
        }

        Ok(chain)
    }

    /// Ids of every node whose name is in `names`. Names may repeat across subtrees.
    pub fn ids_for_names<S: AsRef<str>>(&self, names: &[S]) -> HashSet<CategoryId> {
        let wanted: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        self.nodes
            .values()
            .filter(|node| wanted.contains(node.name.as_str()))
            .map(|node| node.id)
            .collect()
    }

    /// Scope for refreshing `names`: the named categories and all their descendants.
    /// No names means the whole industry relation set is recomputed.
    pub fn refresh_scope<S: AsRef<str>>(&self, names: &[S]) -> Result<RefreshScope> {
        if names.is_empty() {
            return Ok(RefreshScope::All);
        }

        let targets = self.ids_for_names(names);
        if targets.len() < names.len() {
            log::warn!(
                "Only {} of {} refresh categories exist in the schema",
                targets.len(),
                names.len()
            );
        }

        let mut scope = HashSet::new();
        for id in self.nodes.keys() {
            if self.resolve_chain(*id)?.iter().any(|node| targets.contains(&node.id)) {
                scope.insert(*id);
            }
        }
        Ok(RefreshScope::Ids(scope))
    }

    /// Industry edges for `id` and every ancestor, leaf first.
    pub fn edges_for(&self, id: CategoryId) -> Result<Vec<RelationEdge>> {
        Ok(self
            .resolve_chain(id)?
            .into_iter()
            .map(|node| {
                RelationEdge::new(RelationKind::Industry, node.name.clone(), node.id)
                    .with_parent(node.parent_id)
            })
            .collect())
    }
}
