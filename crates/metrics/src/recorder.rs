//! Metrics recorder initialization and configuration.

use {anyhow::Result, tracing::info};

/// Handle to the installed recorder.
#[derive(Clone)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format.
    ///
    /// Empty when collection is disabled or the `prometheus` feature is off.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle
                .as_ref()
                .map(metrics_exporter_prometheus::PrometheusHandle::render)
                .unwrap_or_default()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

/// Configuration for the metrics system.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorderConfig {
    /// Whether metrics collection is enabled
    pub enabled: bool,
}

/// Initialize the metrics system.
///
/// Call once at startup. Without a recorder every `counter!`/`histogram!` call
/// is a no-op.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed (for example, a
/// second global recorder).
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(MetricsHandle {
            #[cfg(feature = "prometheus")]
            prometheus_handle: None,
        });
    }

    #[cfg(feature = "prometheus")]
    {
        let handle = init_prometheus()?;
        info!("prometheus metrics recorder initialized");
        Ok(MetricsHandle {
            prometheus_handle: Some(handle),
        })
    }

    #[cfg(not(feature = "prometheus"))]
    {
        info!("metrics feature not enabled at compile time");
        Ok(MetricsHandle {})
    }
}

#[cfg(feature = "prometheus")]
fn init_prometheus() -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    use {
        crate::{batch, buckets},
        metrics_exporter_prometheus::{Matcher, PrometheusBuilder},
    };

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("_duration_seconds".to_string()),
            buckets::SHORT_DURATION,
        )?
        // Batch inserts run far longer than single operations.
        .set_buckets_for_metric(
            Matcher::Full(batch::DURATION_SECONDS.to_string()),
            buckets::BATCH_DURATION,
        )?;

    // Installs globally without spawning an HTTP listener.
    let handle = builder.install_recorder()?;
    Ok(handle)
}
