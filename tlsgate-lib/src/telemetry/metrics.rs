use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

pub mod labels {
    pub const EVENT: &str = "event";
    pub const ERROR_TYPE: &str = "error_type";
    pub const TLS_VERSION: &str = "tls_version";
    pub const CIPHER_SUITE: &str = "cipher_suite";
    pub const VERSION: &str = "version";
    pub const RUST_VERSION: &str = "rust_version";
}

#[derive(Clone)]
pub struct Metrics {
    /// Mirror of the in-memory stats counters, labelled by stat key
    pub stat_events_total: Counter<u64>,

    // TLS handshake metrics
    pub tls_handshake_duration_seconds: Histogram<f64>,
    pub tls_handshake_errors_total: Counter<u64>,

    // Build info
    pub build_info: Gauge<u64>,
}

impl Metrics {
    fn new(meter: Meter) -> Self {
        Self {
            stat_events_total: meter
                .u64_counter("tlsgate_stat_events_total")
                .with_description("Acceptor lifecycle events (servers created, sessions accepted, ...)")
                .build(),

            tls_handshake_duration_seconds: meter
                .f64_histogram("tlsgate_tls_handshake_duration_seconds")
                .with_description("TLS handshake duration in seconds")
                .build(),
            tls_handshake_errors_total: meter
                .u64_counter("tlsgate_tls_handshake_errors_total")
                .with_description("Total number of failed or timed out TLS handshakes")
                .build(),

            build_info: meter
                .u64_gauge("tlsgate_build_info")
                .with_description("Build information")
                .build(),
        }
    }

    /// Set build info metric with version labels
    pub fn set_build_info(&self) {
        let version = env!("CARGO_PKG_VERSION");
        let rust_version = env!("CARGO_PKG_RUST_VERSION");

        self.build_info.record(
            1,
            &[
                KeyValue::new(labels::VERSION, version),
                KeyValue::new(labels::RUST_VERSION, rust_version),
            ],
        );
    }

    pub fn record_stat(&self, key: &'static str, value: u64) {
        self.stat_events_total
            .add(value, &[KeyValue::new(labels::EVENT, key)]);
    }

    pub fn record_tls_handshake(&self, tls_version: &str, cipher_suite: &str, duration: f64) {
        self.tls_handshake_duration_seconds.record(
            duration,
            &[
                KeyValue::new(labels::TLS_VERSION, tls_version.to_string()),
                KeyValue::new(labels::CIPHER_SUITE, cipher_suite.to_string()),
            ],
        );
    }

    pub fn record_tls_handshake_error(&self, error_type: &'static str) {
        self.tls_handshake_errors_total
            .add(1, &[KeyValue::new(labels::ERROR_TYPE, error_type)]);
    }
}

pub fn init_metrics() -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>>
{
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("tlsgate");
    let metrics = Arc::new(Metrics::new(meter));

    metrics.set_build_info();

    Ok((metrics, registry))
}
