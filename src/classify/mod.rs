//! Industry classification gateway.

mod client;

pub use client::HttpClassifier;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::schema::CategoryId;

/// One leaf category returned for a company.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Classification {
    #[serde(deserialize_with = "category_id")]
    pub id: CategoryId,
    #[serde(default)]
    pub name: String,
}

/// Categories the service is asked to score against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndustrySelection {
    All,
    Named(Vec<String>),
}

impl IndustrySelection {
    /// An empty name list means every category.
    pub fn from_names(names: &[String]) -> Self {
        if names.is_empty() {
            IndustrySelection::All
        } else {
            IndustrySelection::Named(names.to_vec())
        }
    }
}

impl Serialize for IndustrySelection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            IndustrySelection::All => serializer.serialize_str("all"),
            IndustrySelection::Named(names) => names.serialize(serializer),
        }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// One result list per name, in request order.
    async fn classify_batch(&self, names: &[String]) -> Result<Vec<Vec<Classification>>>;

    async fn classify(&self, name: &str) -> Result<Vec<Classification>> {
        let mut lists = self.classify_batch(&[name.to_string()]).await?;
        Ok(if lists.is_empty() { Vec::new() } else { lists.swap_remove(0) })
    }
}

/// The service has returned ids both as numbers and as numeric strings.
fn category_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<CategoryId, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Str(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Int(id) => Ok(id),
        RawId::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selection_serializes_to_wire_shape() {
        assert_eq!(serde_json::to_value(IndustrySelection::All).unwrap(), json!("all"));
        let named = IndustrySelection::from_names(&["生物制药".to_string(), "医疗器械".to_string()]);
        assert_eq!(serde_json::to_value(named).unwrap(), json!(["生物制药", "医疗器械"]));
        assert_eq!(IndustrySelection::from_names(&[]), IndustrySelection::All);
    }

    #[test]
    fn test_classification_accepts_string_and_int_ids() {
        let items: Vec<Classification> =
            serde_json::from_value(json!([{"id": 5, "name": "生物制药", "score": 0.9}, {"id": "7"}])).unwrap();
        assert_eq!(items[0].id, 5);
        assert_eq!(items[1].id, 7);
        assert_eq!(items[1].name, "");
    }

    #[test]
    fn test_classification_rejects_non_numeric_id() {
        let result: std::result::Result<Classification, _> = serde_json::from_value(json!({"id": "abc"}));
        assert!(result.is_err());
    }
}
