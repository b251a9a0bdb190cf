//! Category and division schema: flat relational rows turned into read-only lookup indexes.

mod category;
mod division;
mod loader;

pub use category::{CategoryId, CategoryIndex, CategoryNode, RefreshScope};
pub use division::{DivisionIndex, DivisionNode};
pub use loader::SchemaStore;

use crate::error::Result;

/// Load both indexes once at startup. A category loop aborts the run here.
pub async fn load_indexes(store: &SchemaStore) -> Result<(CategoryIndex, DivisionIndex)> {
    let categories = CategoryIndex::build(store.load_categories().await?)?;
    let divisions = DivisionIndex::build(store.load_divisions().await?);
    Ok((categories, divisions))
}
