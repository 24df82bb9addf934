//! Chat-level helpers on top of the repository.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use {tokio_util::sync::CancellationToken, tracing::info};

use crate::{
    error::Result,
    model::Message,
    repository::{BatchReport, EncryptedRepository},
};

/// Body of every simulated reply.
pub const REPLY_CONTENT: &str = "ok";

/// Delay used by [`simulate_reply`] callers that have no preference.
pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(1500);

/// Messages generated by [`insert_large_dataset`] when no count is given.
pub const DEFAULT_DATASET_SIZE: usize = 200;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Store an outgoing message stamped with the current time.
pub async fn send_message(repo: &EncryptedRepository, content: &str) -> Result<i64> {
    repo.insert_message(&Message::new(content, now_ms(), true))
        .await
}

/// Wait `delay`, then store an incoming `"ok"`.
pub async fn simulate_reply(repo: &EncryptedRepository, delay: Duration) -> Result<i64> {
    tokio::time::sleep(delay).await;
    repo.insert_message(&Message::new(REPLY_CONTENT, now_ms(), false))
        .await
}

/// Build an alternating sent/received conversation that sorts after
/// everything already stored.
///
/// Message `i` (1-based) is sent when `i` is odd, with content
/// `"Test message N"` where numbering continues from `existing_count / 2 + 1`;
/// even `i` is an `"ok"` reply. Timestamps are
/// `max(now, max_timestamp) + (existing_count + i) * 1000`.
pub fn build_dataset(
    count: usize,
    existing_count: i64,
    max_timestamp: i64,
    now: i64,
) -> Vec<Message> {
    let start_number = existing_count / 2 + 1;
    let base = now.max(max_timestamp);

    (1..=count as i64)
        .map(|i| {
            let is_sent = i % 2 == 1;
            let content = if is_sent {
                format!("Test message {}", start_number + (i - 1) / 2)
            } else {
                REPLY_CONTENT.to_string()
            };
            Message::new(content, base + (existing_count + i) * 1000, is_sent)
        })
        .collect()
}

/// Generate `count` messages with [`build_dataset`] and bulk insert them.
pub async fn insert_large_dataset(
    repo: &EncryptedRepository,
    count: usize,
    on_progress: impl FnMut(u8) + Send,
    cancel: &CancellationToken,
) -> Result<BatchReport> {
    let existing = repo.message_count().await?;
    let max_timestamp = repo.max_timestamp().await?;
    let batch = build_dataset(count, existing, max_timestamp, now_ms());

    info!(count, existing, "inserting generated dataset");
    repo.insert_messages(batch, on_progress, cancel).await
}
