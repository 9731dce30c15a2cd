//! End-to-end benchmark scenarios over the in-memory storage client.

use std::sync::Arc;

use bytes::Bytes;
use opentelemetry::Value;
use opentelemetry::metrics::MeterProvider;
use opentelemetry::trace::{Status, TracerProvider};
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

use w1r3_bench::config::{BenchmarkConfig, Transport};
use w1r3_bench::metrics::BenchmarkMetrics;
use w1r3_bench::runner;
use w1r3_bench::usage::AllocationCounter;
use w1r3_bench::workload::UploadStrategy;
use w1r3_client::InMemoryClient;
use w1r3_client::in_memory::Operation;

struct Harness {
    config: Arc<BenchmarkConfig>,
    client: InMemoryClient,
    spans: InMemorySpanExporter,
    metrics: InMemoryMetricExporter,
    // The providers keep the in-memory pipelines alive for the test.
    _tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    data: Bytes,
}

fn harness(uploader: UploadStrategy, fail_uploads: bool) -> Harness {
    let client = InMemoryClient::new();
    if fail_uploads {
        client.fail_uploads();
    }

    let spans = InMemorySpanExporter::default();
    let tracer_provider = SdkTracerProvider::builder()
        .with_simple_exporter(spans.clone())
        .build();

    let metrics = InMemoryMetricExporter::default();
    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(metrics.clone())
        .build();
    let benchmark_metrics = BenchmarkMetrics::new(&meter_provider.meter("w1r3"), "ssb/w1r3");

    let config = BenchmarkConfig {
        object_sizes: vec![1000],
        transports: vec![Transport {
            name: "TEST".to_string(),
            client: Arc::new(client.clone()),
        }],
        uploaders: vec![uploader],
        iterations: 1,
        workers: 1,
        bucket: "bench".to_string(),
        deployment: "test".to_string(),
        instance: "instance".to_string(),
        region: "unknown".to_string(),
        tracer: tracer_provider.tracer("w1r3"),
        metrics: benchmark_metrics,
    };

    Harness {
        config: Arc::new(config),
        client,
        spans,
        metrics,
        _tracer_provider: tracer_provider,
        meter_provider,
        data: Bytes::from(vec![7u8; 2048]),
    }
}

impl Harness {
    async fn run(&self) {
        runner::run(
            Arc::clone(&self.config),
            self.data.clone(),
            AllocationCounter::global(),
        )
        .await;
    }

    fn span_count(&self, name: &str) -> usize {
        self.spans
            .get_finished_spans()
            .unwrap()
            .iter()
            .filter(|span| span.name == name)
            .count()
    }

    /// Sums the sample count of the latency histogram and checks every data
    /// point carries the expected `ssb.transport` attribute.
    fn latency_samples(&self) -> u64 {
        self.meter_provider.force_flush().unwrap();

        let mut samples = 0;
        for resource_metrics in &self.metrics.get_finished_metrics().unwrap() {
            for scope in resource_metrics.scope_metrics() {
                for metric in scope.metrics() {
                    if metric.name() != "ssb/w1r3/latency" {
                        continue;
                    }
                    let AggregatedMetrics::F64(MetricData::Histogram(histogram)) = metric.data()
                    else {
                        panic!("the latency metric is not an f64 histogram");
                    };
                    for point in histogram.data_points() {
                        samples += point.count();
                        assert!(
                            point.attributes().any(|attribute| {
                                attribute.key.as_str() == "ssb.transport"
                                    && attribute.value == Value::from("TEST")
                            }),
                            "data point without the transport attribute"
                        );
                    }
                }
            }
        }
        samples
    }
}

#[tokio::test]
async fn single_iteration_issues_one_write_three_reads_one_delete() {
    let harness = harness(UploadStrategy::SingleShot, false);
    harness.run().await;

    let operations = harness.client.operations();
    let key = match &operations[..] {
        [
            Operation::Put(key),
            Operation::Get(read0),
            Operation::Get(read1),
            Operation::Get(read2),
            Operation::Delete(deleted),
        ] => {
            assert_eq!(read0, key);
            assert_eq!(read1, key);
            assert_eq!(read2, key);
            assert_eq!(deleted, key);
            key.clone()
        }
        _ => panic!("unexpected operation sequence: {operations:?}"),
    };
    assert_eq!(harness.client.stored("bench", &key), None);

    assert_eq!(harness.span_count("ssb::iteration"), 1);
    assert_eq!(harness.span_count("ssb::upload"), 1);
    assert_eq!(harness.span_count("ssb::download"), 3);
    for span in harness.spans.get_finished_spans().unwrap() {
        assert!(
            !matches!(span.status, Status::Error { .. }),
            "unexpected error status on {}",
            span.name
        );
    }

    // One latency+cpu+memory triple per successful operation; four
    // operations total.
    assert_eq!(harness.latency_samples(), 4);
}

#[tokio::test]
async fn resumable_iteration_issues_the_same_sequence() {
    let harness = harness(UploadStrategy::Resumable, false);
    harness.run().await;

    let operations = harness.client.operations();
    assert!(
        matches!(
            &operations[..],
            [
                Operation::Put(_),
                Operation::Get(_),
                Operation::Get(_),
                Operation::Get(_),
                Operation::Delete(_),
            ]
        ),
        "unexpected operation sequence: {operations:?}"
    );

    assert_eq!(harness.latency_samples(), 4);
}

#[tokio::test]
async fn upload_failure_skips_downloads_and_delete() {
    let harness = harness(UploadStrategy::SingleShot, true);
    harness.run().await;

    let operations = harness.client.operations();
    assert!(
        matches!(&operations[..], [Operation::Put(_)]),
        "expected only the failed upload, got {operations:?}"
    );

    let spans = harness.spans.get_finished_spans().unwrap();
    let uploads: Vec<_> = spans.iter().filter(|span| span.name == "ssb::upload").collect();
    assert_eq!(uploads.len(), 1);
    assert!(matches!(uploads[0].status, Status::Error { .. }));
    assert_eq!(harness.span_count("ssb::download"), 0);
    assert_eq!(harness.span_count("ssb::iteration"), 1);

    // Failed operations never produce samples.
    assert_eq!(harness.latency_samples(), 0);
}

#[tokio::test]
async fn workers_run_their_full_iteration_count() {
    let mut harness = harness(UploadStrategy::SingleShot, false);
    {
        let config = Arc::get_mut(&mut harness.config).unwrap();
        config.iterations = 3;
    }
    harness.run().await;

    let operations = harness.client.operations();
    // Three iterations, five operations each, strictly sequential per worker.
    assert_eq!(operations.len(), 15);
    assert_eq!(harness.latency_samples(), 12);
}
