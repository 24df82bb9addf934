//! Storage contract consumed by the repository.

use std::pin::Pin;

use {async_trait::async_trait, futures::Stream};

use crate::{error::StoreError, model::MessageRow};

/// Row order for full reads. Ties on timestamp are broken by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Keyset position: a page starts strictly after this row in
/// `(timestamp, id)` descending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub timestamp: i64,
    pub id: i64,
}

impl From<&MessageRow> for PageCursor {
    fn from(row: &MessageRow) -> Self {
        Self {
            timestamp: row.timestamp,
            id: row.id,
        }
    }
}

pub type RowStream<'a> = Pin<Box<dyn Stream<Item = Result<MessageRow, StoreError>> + Send + 'a>>;

/// Row store for encrypted messages.
///
/// Implementations do not retry; failures surface as-is.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert one row and return the id the store assigned. `row.id` is ignored.
    async fn insert_one(&self, row: &MessageRow) -> Result<i64, StoreError>;

    /// Insert all rows atomically: either every row becomes visible or none does.
    async fn insert_many(&self, rows: &[MessageRow]) -> Result<(), StoreError>;

    /// Stream every row ordered by `(timestamp, id)`.
    fn query_all(&self, order: SortOrder) -> RowStream<'_>;

    /// Up to `limit` rows in `(timestamp, id)` descending order, starting after
    /// `cursor` (or from the newest row).
    async fn query_page(
        &self,
        cursor: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<MessageRow>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    /// Largest stored timestamp, or 0 when empty.
    async fn max_timestamp(&self) -> Result<i64, StoreError>;

    /// Delete every row, returning how many were removed.
    async fn delete_all(&self) -> Result<u64, StoreError>;
}
