//! Encrypt-on-write, decrypt-on-read orchestration over a [`MessageStore`].

use std::{pin::Pin, sync::Arc};

use {
    futures::{Stream, StreamExt, TryStreamExt},
    murmur_vault::CipherEngine,
    serde::Serialize,
    tokio::sync::watch,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use murmur_metrics::{batch as batch_metrics, counter, histogram, labels, messages as msg_metrics};

use crate::{
    cache::DecryptCache,
    error::{RepositoryError, Result},
    model::{EncryptedRecord, Message, MessageRow},
    pager::MessagePager,
    store::{MessageStore, SortOrder},
};

/// Records per atomic bulk write in [`EncryptedRepository::insert_messages`].
pub const CHUNK_SIZE: usize = 50;

/// Encryptions in flight at once within a chunk.
pub const ENCRYPT_CONCURRENCY: usize = 2;

/// Item of [`EncryptedRepository::all_messages`].
pub type MessageStream<'a> = Pin<Box<dyn Stream<Item = Result<Message>> + Send + 'a>>;

/// The full decrypted history at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageSnapshot {
    /// Readable messages, `(timestamp, id)` ascending.
    pub messages: Vec<Message>,
    /// Ids of stored records that failed to decrypt.
    pub unreadable: Vec<i64>,
}

/// Outcome of a bulk insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    /// Messages durably written. Always a whole number of chunks unless the
    /// last chunk was short.
    pub written: usize,
    pub cancelled: bool,
}

/// Repository of encrypted messages.
///
/// Cheap to clone; clones share the store, engine, cache, and change feed.
#[derive(Clone)]
pub struct EncryptedRepository {
    store: Arc<dyn MessageStore>,
    engine: Arc<CipherEngine>,
    cache: Arc<DecryptCache>,
    changes: Arc<watch::Sender<u64>>,
    #[cfg(test)]
    encrypt_gauge: Arc<tests::EncryptGauge>,
}

impl EncryptedRepository {
    pub fn new(store: Arc<dyn MessageStore>, engine: Arc<CipherEngine>) -> Self {
        Self::with_cache(store, engine, Arc::new(DecryptCache::default()))
    }

    pub fn with_cache(
        store: Arc<dyn MessageStore>,
        engine: Arc<CipherEngine>,
        cache: Arc<DecryptCache>,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            store,
            engine,
            cache,
            changes: Arc::new(changes),
            #[cfg(test)]
            encrypt_gauge: Arc::default(),
        }
    }

    pub fn cache(&self) -> &DecryptCache {
        &self.cache
    }

    pub(crate) fn store(&self) -> &dyn MessageStore {
        self.store.as_ref()
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Encrypt and store one message, returning its new id.
    pub async fn insert_message(&self, message: &Message) -> Result<i64> {
        let row = EncryptedRecord::seal(&self.engine, message)?.to_row();
        let id = self.store.insert_one(&row).await?;

        #[cfg(feature = "metrics")]
        counter!(msg_metrics::INSERTED_TOTAL, labels::PATH => "single").increment(1);

        debug!(id, "message stored");
        self.notify();
        Ok(id)
    }

    /// Decrypt a stored row, consulting the cache first.
    ///
    /// `generation` is the cache generation taken before `row` was fetched.
    /// Once the cache has moved on, the row may predate a delete-all: it is
    /// decrypted from its own ciphertext and not cached.
    pub(crate) fn open_row(&self, row: MessageRow, generation: u64) -> Result<Message> {
        if self.cache.generation() == generation
            && let Some(content) = self.cache.get(row.id)
        {
            return Ok(Message {
                id: row.id,
                content,
                timestamp: row.timestamp,
                is_sent: row.is_sent,
            });
        }

        let message = EncryptedRecord::from_row(&row)
            .and_then(|record| record.open(&self.engine))
            .map_err(|source| {
                warn!(id = row.id, error = %source, "skipping unreadable message");

                #[cfg(feature = "metrics")]
                counter!(
                    msg_metrics::UNREADABLE_TOTAL,
                    labels::ERROR_TYPE => unreadable_kind(&source)
                )
                .increment(1);

                RepositoryError::Record { id: row.id, source }
            })?;

        self.cache.put(generation, message.id, message.content.clone());
        Ok(message)
    }

    /// Every message, `(timestamp, id)` ascending, decrypted lazily.
    ///
    /// Unreadable records are yielded in place as
    /// [`RepositoryError::Record`] and the stream carries on; a store failure
    /// is yielded once and ends the stream. Each call reads the store afresh.
    pub fn all_messages(&self) -> MessageStream<'_> {
        #[cfg(feature = "metrics")]
        counter!(msg_metrics::READS_TOTAL).increment(1);

        Box::pin(async_stream::stream! {
            let generation = self.cache.generation();
            let mut rows = self.store.query_all(SortOrder::Ascending);
            while let Some(row) = rows.next().await {
                match row {
                    Ok(row) => yield self.open_row(row, generation),
                    Err(e) => {
                        yield Err(e.into());
                        return;
                    },
                }
            }
        })
    }

    /// Collect the full history, setting unreadable records aside.
    pub async fn snapshot(&self) -> Result<MessageSnapshot> {
        let mut snapshot = MessageSnapshot::default();
        let mut stream = self.all_messages();
        while let Some(item) = stream.next().await {
            match item {
                Ok(message) => snapshot.messages.push(message),
                Err(e) => match e.unreadable_id() {
                    Some(id) => snapshot.unreadable.push(id),
                    None => return Err(e),
                },
            }
        }
        Ok(snapshot)
    }

    /// Emit a snapshot now and again after every write or delete made through
    /// this repository (or a clone of it).
    ///
    /// Changes that land while a snapshot is being read cause one more
    /// emission, so the last item always reflects the latest change.
    pub fn watch_messages(&self) -> Pin<Box<dyn Stream<Item = Result<MessageSnapshot>> + Send>> {
        let repo = self.clone();
        let mut changes = self.changes.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                changes.borrow_and_update();
                yield repo.snapshot().await;
                if changes.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Newest-first pager over the history. See [`MessagePager`].
    pub fn messages_paged(&self, page_size: usize) -> MessagePager {
        MessagePager::new(self.clone(), page_size)
    }

    /// Bulk insert in chunks of [`CHUNK_SIZE`].
    ///
    /// Each chunk is encrypted with at most [`ENCRYPT_CONCURRENCY`] blocking
    /// tasks, then written in one atomic bulk insert. After each write
    /// `on_progress` receives `floor(written * 100 / total)`; the last call is
    /// exactly 100. `cancel` is checked between chunks only: chunks already
    /// written stay written and no further chunk starts. A failure aborts the
    /// current chunk and propagates; earlier chunks are not rolled back.
    pub async fn insert_messages(
        &self,
        batch: Vec<Message>,
        mut on_progress: impl FnMut(u8) + Send,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let total = batch.len();
        let mut report = BatchReport {
            total,
            written: 0,
            cancelled: false,
        };

        #[cfg(feature = "metrics")]
        let start = std::time::Instant::now();

        for chunk in batch.chunks(CHUNK_SIZE) {
            if cancel.is_cancelled() {
                info!(written = report.written, total, "batch insert cancelled");

                #[cfg(feature = "metrics")]
                counter!(batch_metrics::CANCELLED_TOTAL).increment(1);

                report.cancelled = true;
                return Ok(report);
            }

            let rows = self.encrypt_chunk(chunk).await?;
            self.store.insert_many(&rows).await?;

            report.written += chunk.len();
            self.notify();

            #[cfg(feature = "metrics")]
            {
                counter!(batch_metrics::CHUNKS_TOTAL).increment(1);
                counter!(msg_metrics::INSERTED_TOTAL, labels::PATH => "batch")
                    .increment(chunk.len() as u64);
            }

            debug!(written = report.written, total, "batch chunk written");
            on_progress(percent(report.written, total));
        }

        #[cfg(feature = "metrics")]
        histogram!(batch_metrics::DURATION_SECONDS).record(start.elapsed().as_secs_f64());

        info!(total, "batch insert complete");
        Ok(report)
    }

    async fn encrypt_chunk(&self, chunk: &[Message]) -> Result<Vec<MessageRow>> {
        futures::stream::iter(chunk.iter().cloned())
            .map(|message| {
                let engine = Arc::clone(&self.engine);
                #[cfg(test)]
                let gauge = Arc::clone(&self.encrypt_gauge);
                tokio::task::spawn_blocking(move || {
                    #[cfg(test)]
                    let _in_flight = gauge.enter();
                    EncryptedRecord::seal(&engine, &message).map(|record| record.to_row())
                })
            })
            .buffered(ENCRYPT_CONCURRENCY)
            .map(|joined| Ok::<_, RepositoryError>(joined??))
            .try_collect()
            .await
    }

    pub async fn message_count(&self) -> Result<i64> {
        Ok(self.store.count().await?)
    }

    /// Largest stored timestamp, 0 when empty.
    pub async fn max_timestamp(&self) -> Result<i64> {
        Ok(self.store.max_timestamp().await?)
    }

    /// Delete every message and empty the decrypt cache.
    ///
    /// The cache is emptied even when the store delete fails.
    pub async fn delete_all_messages(&self) -> Result<u64> {
        let result = self.store.delete_all().await;
        self.cache.evict_all();
        self.notify();

        let deleted = result?;

        #[cfg(feature = "metrics")]
        counter!(msg_metrics::CLEARS_TOTAL).increment(1);

        info!(deleted, "deleted all messages");
        Ok(deleted)
    }
}

#[cfg(feature = "metrics")]
fn unreadable_kind(error: &murmur_vault::VaultError) -> &'static str {
    match error {
        murmur_vault::VaultError::AuthenticationFailure => "authentication",
        murmur_vault::VaultError::Encoding(_) => "encoding",
        _ => "other",
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from(done.saturating_mul(100) / total).unwrap_or(100)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::test_support::{failing_store, repo},
        std::{
            sync::atomic::{AtomicUsize, Ordering},
            time::Duration,
        },
    };

    /// Counts encryptions running at once inside `encrypt_chunk`.
    #[derive(Default)]
    pub(super) struct EncryptGauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    pub(super) struct InFlight<'a>(&'a EncryptGauge);

    impl EncryptGauge {
        pub(super) fn enter(&self) -> InFlight<'_> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            // Long enough for sibling tasks to overlap.
            std::thread::sleep(Duration::from_millis(5));
            InFlight(self)
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn percent_floors() {
        assert_eq!(percent(50, 1000), 5);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(3, 3), 100);
    }

    #[tokio::test]
    async fn insert_then_read_back() {
        let repo = repo().await;
        let id = repo
            .insert_message(&Message::new("hello", 1000, true))
            .await
            .unwrap();
        assert!(id > 0);

        let snapshot = repo.snapshot().await.unwrap();
        assert_eq!(snapshot.messages, vec![Message {
            id,
            content: "hello".into(),
            timestamp: 1000,
            is_sent: true,
        }]);
        assert!(snapshot.unreadable.is_empty());
    }

    #[tokio::test]
    async fn reads_populate_the_cache() {
        let repo = repo().await;
        let id = repo
            .insert_message(&Message::new("cached", 1, false))
            .await
            .unwrap();
        assert!(!repo.cache().contains(id));

        repo.snapshot().await.unwrap();
        assert!(repo.cache().contains(id));
    }

    #[tokio::test]
    async fn empty_batch_reports_nothing() {
        let repo = repo().await;
        let mut calls = Vec::new();
        let report = repo
            .insert_messages(Vec::new(), |p| calls.push(p), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report, BatchReport {
            total: 0,
            written: 0,
            cancelled: false,
        });
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn short_final_chunk_reaches_100() {
        let repo = repo().await;
        let batch: Vec<Message> = (0..120)
            .map(|i| Message::new(format!("m{i}"), i, i % 2 == 0))
            .collect();

        let mut calls = Vec::new();
        repo.insert_messages(batch, |p| calls.push(p), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(calls, vec![41, 83, 100]);
        assert_eq!(repo.message_count().await.unwrap(), 120);
    }

    #[tokio::test]
    async fn batch_encryption_runs_two_at_a_time() {
        let repo = repo().await;
        let batch: Vec<Message> = (0..60)
            .map(|i| Message::new(format!("m{i}"), i, true))
            .collect();

        repo.insert_messages(batch, |_| {}, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(repo.encrypt_gauge.peak(), ENCRYPT_CONCURRENCY);
        assert_eq!(repo.message_count().await.unwrap(), 60);
    }

    #[tokio::test]
    async fn pre_cancelled_batch_writes_nothing() {
        let repo = repo().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let batch = vec![Message::new("never", 1, true); 10];
        let report = repo.insert_messages(batch, |_| {}, &cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.written, 0);
        assert_eq!(repo.message_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_evicts_even_when_store_fails() {
        let repo = failing_store().await;
        repo.cache().put(repo.cache().generation(), 1, "stale".into());

        assert!(matches!(
            repo.delete_all_messages().await,
            Err(RepositoryError::Store(_))
        ));
        assert!(repo.cache().is_empty());
    }
}
