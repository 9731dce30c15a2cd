//! The continuous object storage benchmark binary.

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use uuid::Uuid;

use w1r3_bench::config::{Args, BenchmarkConfig};
use w1r3_bench::metrics::BenchmarkMetrics;
use w1r3_bench::observability::{self, Telemetry};
use w1r3_bench::usage::{AllocationCounter, CountingAllocator};
use w1r3_bench::{region, runner};

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = argh::from_env();

    observability::init_tracing();

    let instance = Uuid::new_v4().to_string();
    let telemetry = Telemetry::init(&args.otlp_endpoint, &instance, args.tracing_rate)?;
    let region = region::discover().await;

    let metrics = BenchmarkMetrics::new(&telemetry.meter(), &args.metrics_prefix);
    let config = BenchmarkConfig::new(&args, instance, region, telemetry.tracer(), metrics)?;

    let transport_names: Vec<&str> = config
        .transports
        .iter()
        .map(|transport| transport.name.as_str())
        .collect();

    tracing::info!("starting continuous object storage benchmark");
    tracing::info!(
        object_sizes = ?config.object_sizes,
        transports = ?transport_names,
        uploaders = ?config.uploaders,
        iterations = config.iterations,
        workers = config.workers,
        "workload"
    );
    tracing::info!(
        bucket = %config.bucket,
        deployment = %config.deployment,
        instance = %config.instance,
        region = %config.region,
        "placement"
    );
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        sdk_version = w1r3_client::VERSION,
        tracing_rate = args.tracing_rate,
        metrics_prefix = %args.metrics_prefix,
        "telemetry"
    );

    // Random contents shared read-only by all workers, sized to the largest
    // configured object.
    let mut rng = SmallRng::seed_from_u64(rand::random());
    let mut data = vec![0u8; config.buffer_size()];
    rng.fill_bytes(&mut data);
    let data = Bytes::from(data);

    runner::run(Arc::new(config), data, AllocationCounter::global()).await;

    tracing::info!("all workers finished, flushing telemetry");
    telemetry.shutdown()
}
