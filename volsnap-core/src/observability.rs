/*!
Observability infrastructure for volsnap.

- Structured logging setup (`tracing-subscriber`, plain or JSON)
- Prometheus metrics for snapshot runs and object store calls (`metrics` feature)

The `record_*` helpers are always available and do nothing when the crate is
built without `metrics`.
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{Result, VolsnapError};

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<VolsnapMetrics> = OnceLock::new();

/// Metrics collection for backup and restore runs
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct VolsnapMetrics {
    pub snapshots_created_total: Counter,
    pub snapshots_restored_total: Counter,
    pub target_failures_total: Counter,
    pub archive_size_bytes: Histogram,

    pub object_store_requests_total: Counter,
    pub object_store_errors_total: Counter,
    pub object_store_latency_seconds: Histogram,

    // Prometheus registry for scraping
    registry: Registry,
}

#[cfg(feature = "metrics")]
fn metric_error(name: &str, e: prometheus::Error) -> VolsnapError {
    VolsnapError::configuration(format!("Failed to create metric {name}: {e}"))
}

#[cfg(feature = "metrics")]
impl VolsnapMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<Counter> {
            let counter = Counter::new(name, help).map_err(|e| metric_error(name, e))?;
            registry
                .register(Box::new(counter.clone()))
                .map_err(|e| metric_error(name, e))?;
            Ok(counter)
        };
        let histogram = |opts: HistogramOpts| -> Result<Histogram> {
            let name = opts.common_opts.name.clone();
            let histogram = Histogram::with_opts(opts).map_err(|e| metric_error(&name, e))?;
            registry
                .register(Box::new(histogram.clone()))
                .map_err(|e| metric_error(&name, e))?;
            Ok(histogram)
        };

        let snapshots_created_total = counter(
            "volsnap_snapshots_created_total",
            "Snapshots archived and stored",
        )?;
        let snapshots_restored_total = counter(
            "volsnap_snapshots_restored_total",
            "Snapshots downloaded and extracted",
        )?;
        let target_failures_total = counter(
            "volsnap_target_failures_total",
            "Backup or restore targets that failed",
        )?;
        let archive_size_bytes = histogram(
            HistogramOpts::new(
                "volsnap_archive_size_bytes",
                "Size of compressed snapshot archives",
            )
            .buckets(prometheus::exponential_buckets(1024.0, 4.0, 12).map_err(|e| {
                metric_error("volsnap_archive_size_bytes", e)
            })?),
        )?;
        let object_store_requests_total = counter(
            "volsnap_object_store_requests_total",
            "Requests made to the object store",
        )?;
        let object_store_errors_total = counter(
            "volsnap_object_store_errors_total",
            "Object store requests that failed",
        )?;
        let object_store_latency_seconds = histogram(HistogramOpts::new(
            "volsnap_object_store_latency_seconds",
            "Duration of object store requests in seconds",
        ))?;

        Ok(Self {
            snapshots_created_total,
            snapshots_restored_total,
            target_failures_total,
            archive_size_bytes,
            object_store_requests_total,
            object_store_errors_total,
            object_store_latency_seconds,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static VolsnapMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize volsnap metrics"))
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| VolsnapError::configuration(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer).map_err(|e| {
            VolsnapError::configuration(format!("Failed to convert metrics to string: {e}"))
        })
    }
}

/// Record one object store request
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn record_object_store_call(operation: &str, started: Instant, ok: bool) {
    tracing::trace!(operation, elapsed = ?started.elapsed(), ok, "Object store call finished");
    #[cfg(feature = "metrics")]
    {
        let metrics = VolsnapMetrics::global();
        metrics.object_store_requests_total.inc();
        metrics
            .object_store_latency_seconds
            .observe(started.elapsed().as_secs_f64());
        if !ok {
            metrics.object_store_errors_total.inc();
        }
    }
}

/// Record a stored snapshot of `bytes` compressed size
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn record_snapshot_created(bytes: u64) {
    #[cfg(feature = "metrics")]
    {
        let metrics = VolsnapMetrics::global();
        metrics.snapshots_created_total.inc();
        metrics.archive_size_bytes.observe(bytes as f64);
    }
}

/// Record a restored snapshot
pub fn record_snapshot_restored() {
    #[cfg(feature = "metrics")]
    VolsnapMetrics::global().snapshots_restored_total.inc();
}

/// Record a failed target
pub fn record_target_failure() {
    #[cfg(feature = "metrics")]
    VolsnapMetrics::global().target_failures_total.inc();
}

/// Render all metrics, or `None` when built without the `metrics` feature
pub fn render_metrics() -> Option<Result<String>> {
    #[cfg(feature = "metrics")]
    return Some(VolsnapMetrics::global().gather_metrics());
    #[cfg(not(feature = "metrics"))]
    None
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` takes precedence; otherwise `debug` when `verbose`, `info`
/// when not. `json` selects the JSON formatter for log shipping.
pub fn init_observability(verbose: bool, json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    VolsnapMetrics::global();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let installed = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_current_span(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };

    installed.map_err(|e| {
        VolsnapError::configuration(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("volsnap observability initialized");
    Ok(())
}
