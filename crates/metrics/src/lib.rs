//! Metrics for murmur.
//!
//! Call sites record through the `metrics` crate facade using the names in
//! this crate. Nothing is collected unless a recorder is installed; with the
//! `prometheus` feature, [`init_metrics`] installs one that can render the
//! Prometheus text format.
//!
//! ```rust,ignore
//! use murmur_metrics::{cache, counter};
//!
//! counter!(cache::HITS_TOTAL).increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
