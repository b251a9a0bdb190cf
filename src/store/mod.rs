//! Staging and graph document stores.
//!
//! Both are shared across pool workers as `Arc<dyn …>`; the SQLite adapters in
//! [`sqlite`] back the binaries and tests.

pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{EntityDocument, StagedDocument};
use crate::window::SyncWindow;

pub use sqlite::{SqliteGraphStore, SqliteStagingStore};

/// Read side of the staging store.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Documents crawled inside `window`, ascending by id.
    async fn query_window(&self, collection: &str, window: &SyncWindow) -> Result<Vec<StagedDocument>>;
}

/// Keyed document access to the graph store.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// `None` when the entity has not been ingested yet.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<EntityDocument>>;

    /// Overwrite an existing document. Fails with `DocumentNotFound` if absent;
    /// the refresh engine never creates documents.
    async fn put(&self, collection: &str, doc: &EntityDocument) -> Result<()>;

    /// Create a document; returns `false` if the key already exists.
    async fn insert(&self, collection: &str, doc: &EntityDocument) -> Result<bool>;

    /// First document with exactly this name.
    async fn find_by_name(&self, collection: &str, name: &str) -> Result<Option<EntityDocument>>;
}

/// Graph-wide document handle, `collection/key`.
pub fn document_handle(collection: &str, key: &str) -> String {
    format!("{}/{}", collection, key)
}
