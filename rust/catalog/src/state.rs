use crate::query::QueryEngine;

/// Shared by every handler; cloning is cheap.
#[derive(Clone)]
pub struct CatalogState {
    pub engine: QueryEngine,
}

impl From<QueryEngine> for CatalogState {
    fn from(engine: QueryEngine) -> Self {
        Self { engine }
    }
}
