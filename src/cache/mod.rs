//! §4.F Cache store.
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::filter::CachePredicate;
use crate::model::{CacheRow, CacheRowUpdate};

pub use sqlite::SqliteCacheStore;

/// A page of cache rows plus the total row count matching `predicate`
/// (ignoring `offset`/`limit`), for building a SCIM ListResponse.
pub struct Page {
    pub rows: Vec<CacheRow>,
    pub total_results: i64,
}

/// Persisted mapping from SCIM id to directory identity and last-known
/// state (§4.F). Mutation failures are fatal to the enclosing request —
/// distinct from the audit log, whose writes are fire-and-forget.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<CacheRow>>;
    async fn find_by_sam(&self, sam_account_name: &str) -> AppResult<Option<CacheRow>>;
    /// Inserts a new row. A unique-constraint violation on
    /// `sam_account_name` is surfaced as `AppError::Conflict` — this is the
    /// authoritative guard against the create-time uniqueness race (§5).
    async fn insert(&self, row: CacheRow) -> AppResult<()>;
    async fn update(&self, id: &str, update: CacheRowUpdate) -> AppResult<()>;
    async fn delete(&self, id: &str) -> AppResult<()>;
    /// Ordered by `created_at` ascending, per §4.G `list`.
    async fn page(&self, predicate: Option<CachePredicate>, offset: i64, limit: i64) -> AppResult<Page>;
}
