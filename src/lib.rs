pub mod config;
pub mod error;
pub mod db;
pub mod model;
pub mod schema;
pub mod classify;
pub mod reconcile;
pub mod window;
pub mod store;
pub mod pool;
pub mod refresh;
pub mod ingest;

pub use config::Config;
pub use error::{KbsyncError, Result};
pub use model::{EntityDocument, RelationEdge, RelationKind, StagedDocument};
pub use pool::PoolReport;
