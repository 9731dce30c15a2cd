//! Recording of benchmark samples into the output histograms.

use std::fmt;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Histogram, Meter};
use opentelemetry::trace::Span;

use crate::boundaries;
use crate::usage::ResourceUsage;

/// Default name prefix for the three benchmark histograms.
///
/// An ad-hoc prefix can be useful during development, as histograms cannot be
/// updated on the backend without losing all existing data.
pub const DEFAULT_METRICS_PREFIX: &str = "ssb/w1r3";

/// The three output distributions of the benchmark.
pub struct BenchmarkMetrics {
    latency: Histogram<f64>,
    cpu: Histogram<f64>,
    memory: Histogram<f64>,
}

impl fmt::Debug for BenchmarkMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkMetrics").finish_non_exhaustive()
    }
}

impl BenchmarkMetrics {
    /// Creates the histograms on the given meter, with the bucket layout from
    /// [`boundaries`].
    pub fn new(meter: &Meter, prefix: &str) -> Self {
        let latency = meter
            .f64_histogram(format!("{prefix}/latency"))
            .with_description("Operation latency as measured by the benchmark.")
            .with_unit("s")
            .with_boundaries(boundaries::latency())
            .build();

        let cpu = meter
            .f64_histogram(format!("{prefix}/cpu"))
            .with_description("CPU usage per byte as measured by the benchmark.")
            .with_unit("ns/B")
            .with_boundaries(boundaries::cpu_per_byte())
            .build();

        let memory = meter
            .f64_histogram(format!("{prefix}/memory"))
            .with_description("Memory usage per byte as measured by the benchmark.")
            .with_unit("1")
            .with_boundaries(boundaries::memory_per_byte())
            .build();

        Self {
            latency,
            cpu,
            memory,
        }
    }

    /// Records one successful operation and closes its span.
    ///
    /// All three samples carry the supplied attribute set; recording happens
    /// within the span's lifetime so the backend can correlate the samples
    /// with the trace.
    pub fn record(&self, usage: &ResourceUsage, attributes: &[KeyValue], mut span: impl Span) {
        self.latency.record(usage.elapsed.as_secs_f64(), attributes);
        self.cpu.record(usage.cpu, attributes);
        self.memory.record(usage.memory, attributes);
        span.end();
    }
}
