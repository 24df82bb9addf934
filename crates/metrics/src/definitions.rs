//! Metric name and label definitions.
//!
//! Every metric murmur records is named here, grouped by the subsystem that
//! emits it.

/// AEAD engine metrics
pub mod crypto {
    /// Total number of message encryptions
    pub const ENCRYPTIONS_TOTAL: &str = "murmur_crypto_encryptions_total";
    /// Total number of message decryptions attempted
    pub const DECRYPTIONS_TOTAL: &str = "murmur_crypto_decryptions_total";
    /// Decryptions rejected by tag verification or malformed input
    pub const AUTH_FAILURES_TOTAL: &str = "murmur_crypto_auth_failures_total";
}

/// Data key lifecycle metrics
pub mod data_key {
    /// Data key loads, labelled by outcome (created, loaded, unavailable, corrupted)
    pub const LOADS_TOTAL: &str = "murmur_data_key_loads_total";
    /// Time spent loading or creating the data key, in seconds
    pub const LOAD_DURATION_SECONDS: &str = "murmur_data_key_load_duration_seconds";
}

/// Decrypted-plaintext cache metrics
pub mod cache {
    /// Cache lookups that found a plaintext
    pub const HITS_TOTAL: &str = "murmur_cache_hits_total";
    /// Cache lookups that required a decryption
    pub const MISSES_TOTAL: &str = "murmur_cache_misses_total";
    /// Entries dropped to stay within capacity
    pub const EVICTIONS_TOTAL: &str = "murmur_cache_evictions_total";
    /// Current number of cached plaintexts
    pub const ENTRIES: &str = "murmur_cache_entries";
}

/// Message repository metrics
pub mod messages {
    /// Messages encrypted and stored, labelled by path (single, batch)
    pub const INSERTED_TOTAL: &str = "murmur_messages_inserted_total";
    /// Stored records skipped on read because they could not be decrypted
    pub const UNREADABLE_TOTAL: &str = "murmur_messages_unreadable_total";
    /// Full-history reads served
    pub const READS_TOTAL: &str = "murmur_messages_reads_total";
    /// Bulk deletions
    pub const CLEARS_TOTAL: &str = "murmur_messages_clears_total";
}

/// Batch insert metrics
pub mod batch {
    /// Chunks committed by batch inserts
    pub const CHUNKS_TOTAL: &str = "murmur_batch_chunks_total";
    /// Batch inserts stopped by cancellation
    pub const CANCELLED_TOTAL: &str = "murmur_batch_cancelled_total";
    /// Wall time of whole batch inserts, in seconds
    pub const DURATION_SECONDS: &str = "murmur_batch_duration_seconds";
}

/// Common label keys used across metrics
pub mod labels {
    pub const OUTCOME: &str = "outcome";
    pub const PATH: &str = "path";
    pub const BACKEND: &str = "backend";
    pub const ERROR_TYPE: &str = "error_type";
}

/// Standard histogram buckets
pub mod buckets {
    /// Short operation buckets (in seconds)
    /// Covers 1ms to 10s
    pub const SHORT_DURATION: &[f64] = &[
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    /// Batch insert buckets (in seconds)
    /// Covers 10ms to 5 minutes
    pub const BATCH_DURATION: &[f64] = &[
        0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
    ];
}
