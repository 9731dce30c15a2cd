//! Log and telemetry pipeline wiring.
//!
//! Logs go to stderr through `tracing`; benchmark traces and metrics go to an
//! OTLP collector. The telemetry pipelines are owned by [`Telemetry`] and
//! handed to the benchmark core as explicit tracer and meter handles.

use std::env;
use std::fmt;

use anyhow::Result;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Meter, MeterProvider};
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Service name reported to the telemetry backend.
pub const SERVICE_NAME: &str = "w1r3";

/// Tracer type shared by the benchmark core and its tests.
pub type BenchmarkTracer = <SdkTracerProvider as TracerProvider>::Tracer;

/// Owns the telemetry pipelines; keep alive for the benchmark's lifetime and
/// shut down at exit to flush pending data.
pub struct Telemetry {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}

impl Telemetry {
    /// Configures OTLP trace and metric export.
    ///
    /// The resource attributes identify this process instance to the backend
    /// without tying the series to a particular host.
    pub fn init(otlp_endpoint: &str, instance: &str, tracing_rate: f64) -> Result<Self> {
        let resource = Resource::builder()
            .with_service_name(SERVICE_NAME)
            .with_attributes([
                KeyValue::new("service.namespace", "default"),
                KeyValue::new("service.instance.id", instance.to_string()),
            ])
            .build();

        let span_exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(otlp_endpoint)
            .build()?;
        let tracer_provider = SdkTracerProvider::builder()
            .with_batch_exporter(span_exporter)
            .with_resource(resource.clone())
            .with_sampler(Sampler::TraceIdRatioBased(tracing_rate))
            .build();

        let metric_exporter = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(otlp_endpoint)
            .build()?;
        let meter_provider = SdkMeterProvider::builder()
            .with_periodic_exporter(metric_exporter)
            .with_resource(resource)
            .build();

        Ok(Self {
            tracer_provider,
            meter_provider,
        })
    }

    /// The tracer producing benchmark spans.
    pub fn tracer(&self) -> BenchmarkTracer {
        self.tracer_provider.tracer(SERVICE_NAME)
    }

    /// The meter owning the benchmark histograms.
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(SERVICE_NAME)
    }

    /// Flushes pending telemetry and shuts the pipelines down.
    pub fn shutdown(self) -> Result<()> {
        self.tracer_provider.shutdown()?;
        self.meter_provider.shutdown()?;
        Ok(())
    }
}

/// Initializes the log pipeline, writing to stderr.
pub fn init_tracing() {
    let (level, env_filter) = parse_rust_log();
    let format = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(format.with_filter(LevelFilter::from(level)))
        .with(env_filter)
        .init();
}

/// Try to parse `RUST_LOG` as a simple level filter and apply default levels
/// internally. Otherwise, use it literally if the user knows which overrides
/// they want to run.
fn parse_rust_log() -> (Level, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => level,
            Err(_) => return (Level::TRACE, EnvFilter::new(value)),
        },
        Err(_) => Level::INFO,
    };

    // This is the maximum verbosity that will be logged, we filter this down
    // to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        w1r3_bench=TRACE,\
        w1r3_client=TRACE,\
        ",
    );

    (level, env_filter)
}
