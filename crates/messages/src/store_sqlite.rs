//! SQLite-backed message store using sqlx.

use {
    async_trait::async_trait,
    futures::{StreamExt, TryStreamExt},
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    error::StoreError,
    model::MessageRow,
    store::{MessageStore, PageCursor, RowStream, SortOrder},
};

const SELECT_ASC: &str = "SELECT id, encrypted_content, iv, timestamp, is_sent FROM messages
     ORDER BY timestamp ASC, id ASC";
const SELECT_DESC: &str = "SELECT id, encrypted_content, iv, timestamp, is_sent FROM messages
     ORDER BY timestamp DESC, id DESC";

pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    /// Create a store with its own connection pool and run migrations.
    ///
    /// For a shared pool use [`SqliteMessageStore::new`] after calling
    /// [`crate::run_migrations`].
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool (migrations must already be run).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert_one(&self, row: &MessageRow) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO messages (encrypted_content, iv, timestamp, is_sent) VALUES (?, ?, ?, ?)",
        )
        .bind(&row.encrypted_content)
        .bind(&row.iv)
        .bind(row.timestamp)
        .bind(row.is_sent)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn insert_many(&self, rows: &[MessageRow]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO messages (encrypted_content, iv, timestamp, is_sent) VALUES (?, ?, ?, ?)",
            )
            .bind(&row.encrypted_content)
            .bind(&row.iv)
            .bind(row.timestamp)
            .bind(row.is_sent)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    fn query_all(&self, order: SortOrder) -> RowStream<'_> {
        let sql = match order {
            SortOrder::Ascending => SELECT_ASC,
            SortOrder::Descending => SELECT_DESC,
        };
        sqlx::query_as::<_, MessageRow>(sql)
            .fetch(&self.pool)
            .map_err(StoreError::from)
            .boxed()
    }

    async fn query_page(
        &self,
        cursor: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<MessageRow>, StoreError> {
        let rows = match cursor {
            None => {
                sqlx::query_as::<_, MessageRow>(
                    "SELECT id, encrypted_content, iv, timestamp, is_sent FROM messages
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?",
                )
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await?
            },
            Some(cursor) => {
                sqlx::query_as::<_, MessageRow>(
                    "SELECT id, encrypted_content, iv, timestamp, is_sent FROM messages
                     WHERE timestamp < ? OR (timestamp = ? AND id < ?)
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?",
                )
                .bind(cursor.timestamp)
                .bind(cursor.timestamp)
                .bind(cursor.id)
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await?
            },
        };
        Ok(rows)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn max_timestamp(&self) -> Result<i64, StoreError> {
        let max = sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(timestamp), 0) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM messages")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
