//! Benchmark configuration.
//!
//! The CLI surface is parsed with `argh`, validated, and turned into an
//! immutable [`BenchmarkConfig`] before the first worker starts. Unknown
//! transport or uploader names are configuration errors and fatal to the
//! whole run.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use argh::FromArgs;
use w1r3_client::{BoxedClient, HttpClient, Protocol};

use crate::metrics::{BenchmarkMetrics, DEFAULT_METRICS_PREFIX};
use crate::observability::BenchmarkTracer;
use crate::workload::UploadStrategy;

/// Decimal kilobyte.
pub const KB: u64 = 1000;
/// Decimal megabyte.
pub const MB: u64 = 1000 * KB;
/// Binary kibibyte.
pub const KIB: u64 = 1024;
/// Binary mebibyte.
pub const MIB: u64 = 1024 * KIB;

/// Continuous write-1-read-3 benchmark against an object storage service.
#[derive(Debug, FromArgs)]
pub struct Args {
    /// base URL of the object storage service
    #[argh(option)]
    pub endpoint: String,

    /// the bucket used by the benchmark
    #[argh(option)]
    pub bucket: String,

    /// where the benchmark is running, for example: development, GKE, GCE
    #[argh(option, default = "String::from(\"development\")")]
    pub deployment: String,

    /// how many iterations each worker runs
    #[argh(option, default = "1_000_000")]
    pub iterations: u64,

    /// the number of concurrent workers running the benchmark
    #[argh(option, default = "1")]
    pub workers: usize,

    /// the transports (HTTP, HTTP2) used by the benchmark; repeatable
    #[argh(option)]
    pub transport: Vec<String>,

    /// the uploaders (SINGLE-SHOT, RESUMABLE) used by the benchmark;
    /// repeatable
    #[argh(option)]
    pub uploader: Vec<String>,

    /// the object sizes used by the benchmark, in bytes; repeatable
    #[argh(option)]
    pub object_size: Vec<u64>,

    /// OTLP endpoint receiving benchmark traces and metrics
    #[argh(option, default = "String::from(\"http://localhost:4317\")")]
    pub otlp_endpoint: String,

    /// the sample rate for traces
    #[argh(option, default = "0.05")]
    pub tracing_rate: f64,

    /// metric name prefix; an ad-hoc prefix is useful during development as
    /// histograms cannot be updated without losing existing data
    #[argh(option, default = "DEFAULT_METRICS_PREFIX.to_string()")]
    pub metrics_prefix: String,
}

/// A named transport with its connected client.
#[derive(Clone, Debug)]
pub struct Transport {
    /// The name reported in the `ssb.transport` attribute.
    pub name: String,
    /// The connected client for this transport.
    pub client: BoxedClient,
}

/// Immutable configuration shared read-only by all workers.
pub struct BenchmarkConfig {
    /// Candidate object sizes, in bytes; non-empty, all positive.
    pub object_sizes: Vec<u64>,
    /// The configured transports; non-empty, names unique.
    pub transports: Vec<Transport>,
    /// The configured upload strategies; non-empty.
    pub uploaders: Vec<UploadStrategy>,
    /// Iterations each worker runs.
    pub iterations: u64,
    /// Number of concurrent workers.
    pub workers: usize,
    /// Bucket targeted by all operations.
    pub bucket: String,
    /// Deployment label attached to every sample.
    pub deployment: String,
    /// Process instance identifier, generated once at startup.
    pub instance: String,
    /// Discovered deployment region, or `unknown`.
    pub region: String,
    /// Tracer producing the benchmark spans.
    pub tracer: BenchmarkTracer,
    /// The three output histograms.
    pub metrics: BenchmarkMetrics,
}

impl std::fmt::Debug for BenchmarkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkConfig")
            .field("object_sizes", &self.object_sizes)
            .field("transports", &self.transports)
            .field("uploaders", &self.uploaders)
            .field("iterations", &self.iterations)
            .field("workers", &self.workers)
            .field("bucket", &self.bucket)
            .field("deployment", &self.deployment)
            .field("instance", &self.instance)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl BenchmarkConfig {
    /// Validates the parsed arguments and connects one client per transport.
    pub fn new(
        args: &Args,
        instance: String,
        region: String,
        tracer: BenchmarkTracer,
        metrics: BenchmarkMetrics,
    ) -> Result<Self> {
        let object_sizes = if args.object_size.is_empty() {
            vec![100 * KB, 2 * MIB, 100 * MB]
        } else {
            args.object_size.clone()
        };
        if object_sizes.contains(&0) {
            bail!("object sizes must be positive");
        }

        if args.workers == 0 {
            bail!("at least one worker is required");
        }
        if args.bucket.is_empty() {
            bail!("the bucket name must not be empty");
        }
        if !(0.0..=1.0).contains(&args.tracing_rate) {
            bail!("the tracing rate must be within [0, 1]");
        }

        Ok(Self {
            object_sizes,
            transports: make_transports(&args.transport, &args.endpoint)?,
            uploaders: make_uploaders(&args.uploader)?,
            iterations: args.iterations,
            workers: args.workers,
            bucket: args.bucket.clone(),
            deployment: args.deployment.clone(),
            instance,
            region,
            tracer,
            metrics,
        })
    }

    /// Size of the shared data buffer: the largest configured object.
    pub fn buffer_size(&self) -> usize {
        self.object_sizes.iter().copied().max().unwrap_or(0) as usize
    }
}

fn make_transports(names: &[String], endpoint: &str) -> Result<Vec<Transport>> {
    let default_names = ["HTTP".to_string(), "HTTP2".to_string()];
    let names = if names.is_empty() {
        &default_names[..]
    } else {
        names
    };

    let mut transports: Vec<Transport> = Vec::with_capacity(names.len());
    for name in names {
        if transports.iter().any(|transport| &transport.name == name) {
            bail!("duplicate transport name {name}");
        }
        let protocol = match name.as_str() {
            "HTTP" => Protocol::Http1,
            "HTTP2" => Protocol::Http2,
            _ => bail!("unknown transport name {name}"),
        };
        let client = HttpClient::new(endpoint, protocol)
            .with_context(|| format!("failed to create the {name} client"))?;

        transports.push(Transport {
            name: name.clone(),
            client: Arc::new(client),
        });
    }

    Ok(transports)
}

fn make_uploaders(names: &[String]) -> Result<Vec<UploadStrategy>> {
    if names.is_empty() {
        return Ok(vec![UploadStrategy::SingleShot, UploadStrategy::Resumable]);
    }

    names
        .iter()
        .map(|name| {
            UploadStrategy::parse(name).ok_or_else(|| anyhow::anyhow!("unknown uploader name {name}"))
        })
        .collect()
}
