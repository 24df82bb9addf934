//! Encrypted message storage.
//!
//! [`EncryptedRepository`] turns [`Message`]s into AES-256-GCM sealed rows on
//! write and decrypts them (through a bounded [`DecryptCache`]) on read. Rows
//! live in any [`MessageStore`]; [`SqliteMessageStore`] is the bundled one.

pub mod cache;
pub mod conversation;
pub mod error;
pub mod model;
pub mod pager;
pub mod repository;
pub mod store;
pub mod store_sqlite;

pub use {
    cache::DecryptCache,
    error::{RepositoryError, Result, StoreError},
    model::{EncryptedRecord, Message, MessageRow},
    pager::MessagePager,
    repository::{BatchReport, EncryptedRepository, MessageSnapshot, MessageStream},
    store::{MessageStore, PageCursor, SortOrder},
    store_sqlite::SqliteMessageStore,
};

/// Run database migrations for the message store.
///
/// Creates the `messages` table and its `(timestamp, id)` index.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> std::result::Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
