use crate::error::OrderError;
use crate::model::ModelId;
use crate::storage::CatalogCache;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Which side of the catalog a cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Dish,
    Setmeal,
}

impl CatalogKind {
    pub fn key_prefix(self) -> &'static str {
        match self {
            CatalogKind::Dish => "dish_",
            CatalogKind::Setmeal => "setmeal_",
        }
    }
}

/// Write-through invalidation for the category-keyed catalog cache.
///
/// Catalog mutations only ever make *future* cart pricing fresher or
/// staler; orders and their line items are frozen snapshots and are
/// never touched from here.
pub struct CatalogCachePolicy {
    cache: Arc<dyn CatalogCache>,
}

impl CatalogCachePolicy {
    pub fn new(cache: Arc<dyn CatalogCache>) -> Self {
        Self { cache }
    }

    pub fn category_key(kind: CatalogKind, category_id: ModelId) -> String {
        format!("{}{}", kind.key_prefix(), category_id)
    }

    /// Read-through lookup of one category's serialized listing,
    /// filling the cache on a miss.
    pub async fn read_category<F, Fut>(
        &self,
        kind: CatalogKind,
        category_id: ModelId,
        loader: F,
    ) -> Result<String, OrderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, OrderError>>,
    {
        let key = Self::category_key(kind, category_id);
        if let Some(cached) = self.cache.get(&key).await? {
            debug!(%key, "catalog cache hit");
            return Ok(cached);
        }

        let loaded = loader().await?;
        self.cache.set(&key, loaded.clone()).await?;
        debug!(%key, "catalog cache filled");
        Ok(loaded)
    }

    /// A mutation scoped to one category drops exactly that entry.
    pub async fn invalidate_category(
        &self,
        kind: CatalogKind,
        category_id: ModelId,
    ) -> Result<(), OrderError> {
        let key = Self::category_key(kind, category_id);
        debug!(%key, "invalidating catalog cache entry");
        self.cache.delete(&key).await
    }

    /// Bulk mutations (batch delete, sale-status toggles) wipe every
    /// entry of the kind by prefix instead of enumerating keys.
    pub async fn invalidate_all(&self, kind: CatalogKind) -> Result<(), OrderError> {
        debug!(prefix = kind.key_prefix(), "invalidating catalog cache by prefix");
        self.cache.delete_by_prefix(kind.key_prefix()).await
    }
}
