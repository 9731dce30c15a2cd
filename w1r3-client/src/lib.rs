//! Storage client used by the w1r3 benchmark.
//!
//! The benchmark measures the client-observable behavior of a remote object
//! store. This crate defines the [`StorageClient`] capability the benchmark
//! drives, an HTTP implementation with selectable protocol variants (the
//! benchmark's *transports*), and an in-memory implementation for tests.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

pub mod http;
pub mod in_memory;

pub use crate::http::{HttpClient, Protocol};
pub use crate::in_memory::InMemoryClient;

/// The crate version, attached to benchmark samples as `ssb.version.sdk`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("w1r3-client/", env!("CARGO_PKG_VERSION"));

/// Type alias for the byte streams returned by [`StorageClient::get_object`].
///
/// The stream signals end-of-data by terminating and failures through `Err`
/// items.
pub type PayloadStream = BoxStream<'static, std::io::Result<Bytes>>;

/// A type-erased, shareable [`StorageClient`].
pub type BoxedClient = Arc<dyn StorageClient>;

/// Errors surfaced by storage clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request cannot be served as posed, e.g. it exceeds the source
    /// buffer.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The object does not exist on the remote.
    #[error("object not found: {0}")]
    NotFound(String),

    /// I/O errors related to payload streaming.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the underlying HTTP client, both connection failures and
    /// request construction errors.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote answered with a status code the client does not expect.
    #[error("unexpected status: {0}")]
    UnexpectedStatus(reqwest::StatusCode),

    /// A chunked upload session is no longer accepting data.
    #[error("upload session closed prematurely")]
    SessionClosed,
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// A connected client for one transport of the remote object store.
///
/// The benchmark core only ever talks to the store through this capability;
/// constructing concrete clients per transport happens at configuration time.
#[async_trait::async_trait]
pub trait StorageClient: fmt::Debug + Send + Sync + 'static {
    /// Stores an object with a single bounded write.
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> ClientResult<()>;

    /// Opens a chunked write session for the given object.
    ///
    /// The object becomes visible once [`WriteSession::close`] completes.
    async fn start_resumable(&self, bucket: &str, key: &str) -> ClientResult<Box<dyn WriteSession>>;

    /// Retrieves an object as a stream of byte chunks.
    async fn get_object(&self, bucket: &str, key: &str) -> ClientResult<PayloadStream>;

    /// Deletes the object.
    async fn delete_object(&self, bucket: &str, key: &str) -> ClientResult<()>;
}

/// An in-flight chunked upload opened via [`StorageClient::start_resumable`].
#[async_trait::async_trait]
pub trait WriteSession: Send {
    /// Appends one chunk to the upload.
    async fn write(&mut self, chunk: Bytes) -> ClientResult<()>;

    /// Completes the upload and surfaces the final status.
    async fn close(self: Box<Self>) -> ClientResult<()>;
}
