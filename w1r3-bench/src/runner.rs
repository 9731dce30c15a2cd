//! The benchmark execution engine.
//!
//! A fixed pool of independent workers runs identical loops over the shared
//! immutable configuration. Each iteration uploads one object with a randomly
//! chosen size, transport and upload strategy, reads it back three times, and
//! finally deletes it. Every sub-operation is bracketed by usage snapshots
//! and traced with its own span nested under an iteration-level span.
//!
//! Errors are handled at iteration granularity: a failed upload or download
//! marks that operation's span, abandons the rest of the iteration without
//! deleting, and the worker moves on. Nothing here retries; retry behavior
//! belongs to the transport, not the benchmark.

use std::sync::Arc;

use bytes::Bytes;
use opentelemetry::trace::{Span, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio_util::io::StreamReader;
use w1r3_client::ClientResult;

use crate::config::{BenchmarkConfig, Transport};
use crate::usage::{AllocationCounter, ResourceUsage, UsageSnapshot};
use crate::workload::{UploadStrategy, object_name, pick_one};

/// Runs the configured number of workers to completion.
///
/// Workers are isolated: a panicking worker is logged and does not affect the
/// others.
pub async fn run(config: Arc<BenchmarkConfig>, data: Bytes, counter: AllocationCounter) {
    let workers: Vec<_> = (0..config.workers)
        .map(|_| {
            let config = Arc::clone(&config);
            let data = data.clone();
            tokio::spawn(worker_loop(config, data, counter))
        })
        .collect();

    for worker in futures::future::join_all(workers).await {
        if let Err(err) = worker {
            tracing::error!(error = %err, "benchmark worker died");
        }
    }
}

async fn worker_loop(config: Arc<BenchmarkConfig>, data: Bytes, counter: AllocationCounter) {
    // Each worker seeds its own generator, so pick sequences diverge across
    // workers without coordination.
    let mut rng = SmallRng::seed_from_u64(rand::random());

    for iteration in 0..config.iterations {
        let plan = Iteration::plan(&config, &mut rng, counter);
        plan.run(&data, iteration).await;
    }
}

/// One planned write-1-read-3 cycle.
struct Iteration<'a> {
    config: &'a BenchmarkConfig,
    transport: &'a Transport,
    uploader: UploadStrategy,
    object_name: String,
    object_size: u64,
    common: Vec<KeyValue>,
    counter: AllocationCounter,
}

impl<'a> Iteration<'a> {
    fn plan(config: &'a BenchmarkConfig, rng: &mut SmallRng, counter: AllocationCounter) -> Self {
        let object_size = *pick_one(rng, &config.object_sizes);
        let transport = pick_one(rng, &config.transports);
        let uploader = *pick_one(rng, &config.uploaders);
        let object_name = object_name(rng);

        // The attribute set shared by the iteration span and every
        // sub-operation; sub-operations extend a copy with their own `ssb.op`.
        let common = vec![
            KeyValue::new("ssb.language", "rust"),
            KeyValue::new("ssb.object-size", object_size as i64),
            KeyValue::new("ssb.transport", transport.name.clone()),
            KeyValue::new("ssb.deployment", config.deployment.clone()),
            KeyValue::new("ssb.instance", config.instance.clone()),
            KeyValue::new("ssb.region", config.region.clone()),
            KeyValue::new("ssb.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("ssb.version.sdk", w1r3_client::VERSION),
        ];

        Self {
            config,
            transport,
            uploader,
            object_name,
            object_size,
            common,
            counter,
        }
    }

    async fn run(&self, data: &Bytes, iteration: u64) {
        let mut iteration_attributes = self.common.clone();
        iteration_attributes.push(KeyValue::new("ssb.iteration", iteration as i64));

        let tracer = &self.config.tracer;
        let span = tracer
            .span_builder("ssb::iteration")
            .with_attributes(iteration_attributes)
            .start_with_context(tracer, &Context::new());
        let iteration_cx = Context::new().with_span(span);

        let mut completed = self.upload(&iteration_cx, data).await;
        if completed {
            for read_index in 0..3 {
                if !self.download(&iteration_cx, read_index).await {
                    completed = false;
                    break;
                }
            }
        }

        iteration_cx.span().end();

        // Deletion is cleanup, not benchmark signal: it runs after the
        // iteration span is closed, only for fully completed iterations, and
        // its outcome is never escalated.
        if completed
            && let Err(err) = self
                .transport
                .client
                .delete_object(&self.config.bucket, &self.object_name)
                .await
        {
            tracing::debug!(
                object_name = %self.object_name,
                error = %err,
                "failed to delete benchmark object"
            );
        }
    }

    async fn upload(&self, parent: &Context, data: &Bytes) -> bool {
        let attributes = self.with_op(self.uploader.name());
        let tracer = &self.config.tracer;
        let mut span = tracer
            .span_builder("ssb::upload")
            .with_attributes(attributes.clone())
            .start_with_context(tracer, parent);

        let start = UsageSnapshot::capture(self.counter);
        let result = self
            .uploader
            .upload(
                self.transport.client.as_ref(),
                &self.config.bucket,
                &self.object_name,
                self.object_size,
                data,
            )
            .await;

        match result {
            Ok(()) => {
                let end = UsageSnapshot::capture(self.counter);
                let usage = ResourceUsage::between(&start, &end, self.object_size);
                self.config.metrics.record(&usage, &attributes, span);
                true
            }
            Err(err) => {
                span.record_error(&err);
                span.set_status(Status::error(err.to_string()));
                span.end();
                false
            }
        }
    }

    async fn download(&self, parent: &Context, read_index: usize) -> bool {
        let op = format!("READ[{read_index}]");
        let attributes = self.with_op(&op);
        let tracer = &self.config.tracer;
        let mut span = tracer
            .span_builder("ssb::download")
            .with_attributes(attributes.clone())
            .start_with_context(tracer, parent);

        let start = UsageSnapshot::capture(self.counter);
        match self.download_object().await {
            Ok(_bytes_read) => {
                let end = UsageSnapshot::capture(self.counter);
                let usage = ResourceUsage::between(&start, &end, self.object_size);
                self.config.metrics.record(&usage, &attributes, span);
                true
            }
            Err(err) => {
                span.record_error(&err);
                span.set_status(Status::error(err.to_string()));
                span.end();
                false
            }
        }
    }

    /// Streams the full object into a discard sink, so the memory cost of a
    /// download stays decoupled from the object size.
    async fn download_object(&self) -> ClientResult<u64> {
        let stream = self
            .transport
            .client
            .get_object(&self.config.bucket, &self.object_name)
            .await?;

        let mut reader = StreamReader::new(stream);
        let copied = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
        Ok(copied)
    }

    fn with_op(&self, op: &str) -> Vec<KeyValue> {
        let transfer_type = if op.starts_with("READ") {
            "DOWNLOAD"
        } else {
            "UPLOAD"
        };

        let mut attributes = self.common.clone();
        attributes.push(KeyValue::new("ssb.op", op.to_string()));
        attributes.push(KeyValue::new("ssb.transfer.type", transfer_type));
        attributes
    }
}
