use std::collections::HashSet;
use std::sync::Arc;

use crate::classify::Classifier;
use crate::error::{KbsyncError, Result};
use crate::model::{ObjectId, RelationEdge, RelationKind, StagedDocument};
use crate::schema::{CategoryIndex, DivisionIndex, SchemaStore};
use crate::store::{document_handle, GraphStore};

/// Computes the fresh edges of one relation kind for a staged entity.
pub struct RelationResolver {
    categories: Arc<CategoryIndex>,
    divisions: Arc<DivisionIndex>,
    classifier: Option<Arc<dyn Classifier>>,
    schema: SchemaStore,
    graph: Arc<dyn GraphStore>,
    company_collection: String,
}

impl RelationResolver {
    pub fn new(
        categories: Arc<CategoryIndex>,
        divisions: Arc<DivisionIndex>,
        schema: SchemaStore,
        graph: Arc<dyn GraphStore>,
        company_collection: impl Into<String>,
    ) -> Self {
        Self {
            categories,
            divisions,
            classifier: None,
            schema,
            graph,
            company_collection: company_collection.into(),
        }
    }

    /// Required before resolving `Industry` edges.
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub async fn resolve(&self, kind: &RelationKind, doc: &StagedDocument) -> Result<Vec<RelationEdge>> {
        match kind {
            RelationKind::Industry => self.industry_edges(&doc.name).await,
            RelationKind::Division => Ok(self.divisions.edges_for(
                doc.property_str("province"),
                doc.property_str("city"),
                doc.property_str("area"),
            )),
            RelationKind::Channel => self.schema.channels_for(&doc.name).await,
            RelationKind::Company => self.owner_edges(doc).await,
            RelationKind::Other(tag) => Err(KbsyncError::InvalidInput(format!(
                "no resolver for relation type {}",
                tag
            ))),
        }
    }

    /// Classified leaf categories expanded to their full ancestor chains.
    ///
    /// An unreachable classifier counts as no classifications for this entity.
    async fn industry_edges(&self, name: &str) -> Result<Vec<RelationEdge>> {
        let classifier = self
            .classifier
            .as_ref()
            .ok_or_else(|| KbsyncError::Config("industry refresh needs a classifier".to_string()))?;

        let classifications = match classifier.classify(name).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!("No classifications for [{}]: {}", name, e);
                return Ok(Vec::new());
            }
        };

        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut edges = Vec::new();
        for classification in classifications {
            if self.categories.get(classification.id).is_none() {
                log::debug!("Dropping unknown category {} for [{}]", classification.id, name);
                continue;
            }
            for edge in self.categories.edges_for(classification.id)? {
                if seen.insert(edge.object_id.clone()) {
                    edges.push(edge);
                }
            }
        }
        Ok(edges)
    }

    /// Edge to the owning company, found by `properties.company_name`.
    async fn owner_edges(&self, doc: &StagedDocument) -> Result<Vec<RelationEdge>> {
        let Some(owner_name) = doc.property_str("company_name") else {
            return Ok(Vec::new());
        };

        match self.graph.find_by_name(&self.company_collection, owner_name).await? {
            Some(owner) => {
                let id = document_handle(&self.company_collection, &owner.key);
                Ok(vec![RelationEdge::new(RelationKind::Company, owner.name, id.as_str())])
            }
            None => {
                log::debug!("Owner [{}] of [{}] not in {}", owner_name, doc.name, self.company_collection);
                Ok(Vec::new())
            }
        }
    }
}
