//! Entity documents and relation edges as stored in the graph.
//!
//! Relation tags are typed as [`RelationKind`]; the `concept_relation/…` strings
//! only appear at the serialization boundary.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of node a relation edge points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationKind {
    Company,
    Division,
    Channel,
    Industry,
    /// Tag written by some other pipeline; carried through untouched.
    Other(String),
}

/// Store identifiers for each known kind.
const RELATION_TAGS: &[(RelationKind, &str)] = &[
    (RelationKind::Company, "concept_relation/100002"),
    (RelationKind::Division, "concept_relation/100004"),
    (RelationKind::Channel, "concept_relation/100010"),
    (RelationKind::Industry, "concept_relation/100011"),
];

impl RelationKind {
    pub fn tag(&self) -> &str {
        match self {
            RelationKind::Other(tag) => tag,
            known => RELATION_TAGS
                .iter()
                .find(|(kind, _)| kind == known)
                .map(|(_, tag)| *tag)
                .unwrap_or_default(),
        }
    }

    /// `object_type` written on edges of this kind
    pub fn object_type(&self) -> &str {
        match self {
            RelationKind::Company => "company",
            RelationKind::Division => "division",
            RelationKind::Channel => "channel",
            RelationKind::Industry => "industry",
            RelationKind::Other(_) => "unknown",
        }
    }

    /// Parse a config name such as `"industry"`.
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "company" => Some(RelationKind::Company),
            "division" => Some(RelationKind::Division),
            "channel" => Some(RelationKind::Channel),
            "industry" => Some(RelationKind::Industry),
            _ => None,
        }
    }
}

impl From<String> for RelationKind {
    fn from(tag: String) -> Self {
        RELATION_TAGS
            .iter()
            .find(|(_, t)| *t == tag)
            .map(|(kind, _)| kind.clone())
            .unwrap_or(RelationKind::Other(tag))
    }
}

impl From<RelationKind> for String {
    fn from(kind: RelationKind) -> Self {
        kind.tag().to_string()
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.object_type())
    }
}

/// Id of the node an edge points at: numeric for schema tables, `collection/key` for graph documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectId {
    Int(i64),
    Str(String),
}

impl From<i64> for ObjectId {
    fn from(id: i64) -> Self {
        ObjectId::Int(id)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        ObjectId::Str(id.to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Int(id) => write!(f, "{}", id),
            ObjectId::Str(id) => f.write_str(id),
        }
    }
}

/// A typed link from an entity document to a category, division, channel or company node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub relation_type: RelationKind,
    pub object_name: String,
    pub object_type: String,
    pub object_id: ObjectId,
    /// Outer `None`: field absent. `Some(None)`: stored as null (a root category).
    #[serde(default, deserialize_with = "present_field", skip_serializing_if = "Option::is_none")]
    pub object_parent_id: Option<Option<i64>>,
    /// Fields written by other pipelines (review flags, scores, …)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RelationEdge {
    pub fn new(kind: RelationKind, object_name: impl Into<String>, object_id: impl Into<ObjectId>) -> Self {
        Self {
            object_type: kind.object_type().to_string(),
            relation_type: kind,
            object_name: object_name.into(),
            object_id: object_id.into(),
            object_parent_id: None,
            extra: Map::new(),
        }
    }

    /// Always writes the field, null for roots.
    pub fn with_parent(mut self, parent_id: Option<i64>) -> Self {
        self.object_parent_id = Some(parent_id);
        self
    }

    pub fn parent_id(&self) -> Option<i64> {
        self.object_parent_id.flatten()
    }

    /// Identity used for de-duplication within one relation set
    pub fn identity(&self) -> (&RelationKind, &ObjectId) {
        (&self.relation_type, &self.object_id)
    }
}

/// Entity document as stored in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDocument {
    #[serde(rename = "_key")]
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub relations: Vec<RelationEdge>,
    #[serde(default)]
    pub tags: Vec<Value>,
    /// Set once at ingestion, in whatever format the writer used; never reparsed.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub create_time: Value,
    #[serde(default = "Utc::now", deserialize_with = "stored_timestamp")]
    pub update_time: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityDocument {
    pub fn new(key: impl Into<String>, name: impl Into<String>, properties: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            name: name.into(),
            properties,
            relations: Vec::new(),
            tags: Vec::new(),
            create_time: Value::String(now.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            update_time: now,
            extra: Map::new(),
        }
    }

    /// String property, `None` when absent, null or empty
    pub fn property_str(&self, key: &str) -> Option<&str> {
        property_str(&self.properties, key)
    }
}

/// Document read from the staging store.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedDocument {
    pub id: String,
    pub name: String,
    pub properties: Map<String, Value>,
    pub crawl_time: DateTime<Utc>,
}

impl StagedDocument {
    pub fn property_str(&self, key: &str) -> Option<&str> {
        property_str(&self.properties, key)
    }
}

/// Offset of timestamps written without one by the legacy pipeline.
const LEGACY_OFFSET_SECS: i32 = 8 * 3600;

fn present_field<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Option<i64>>, D::Error> {
    Option::<i64>::deserialize(deserializer).map(Some)
}

/// RFC 3339, or the legacy naive `YYYY-MM-DD HH:MM:SS[.ffffff]` read as `+08:00`.
fn stored_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_stored_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp '{}'", raw)))
}

fn parse_stored_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    FixedOffset::east_opt(LEGACY_OFFSET_SECS)?
        .from_local_datetime(&naive)
        .single()
        .map(|ts| ts.with_timezone(&Utc))
}

fn property_str<'a>(properties: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    properties
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
