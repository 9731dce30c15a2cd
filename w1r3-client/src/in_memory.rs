//! In-memory client for tests.
//!
//! This provides a [`StorageClient`] backed by a `HashMap`, removing the need
//! for a running storage service in unit tests. The client is [`Clone`] so
//! tests can hold a handle for direct inspection while the benchmark owns a
//! boxed copy. Every issued operation is recorded so tests can assert on call
//! order, and uploads support failure injection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

use crate::{ClientError, ClientResult, PayloadStream, StorageClient, WriteSession};

/// Chunk size used when streaming stored objects back out.
const READ_CHUNK: usize = 256 * 1024;

/// One storage operation issued against an [`InMemoryClient`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operation {
    /// A single-shot upload or a completed upload session for the given key.
    Put(String),
    /// A streaming read of the given key.
    Get(String),
    /// A deletion of the given key.
    Delete(String),
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<(String, String), Bytes>,
    operations: Vec<Operation>,
    fail_uploads: bool,
}

/// A [`StorageClient`] backed by process memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryClient {
    state: Arc<Mutex<State>>,
}

impl InMemoryClient {
    /// Creates an empty client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes all subsequent uploads fail with a synthetic transport error.
    pub fn fail_uploads(&self) {
        self.state.lock().unwrap().fail_uploads = true;
    }

    /// Returns the operations issued so far, in order.
    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().unwrap().operations.clone()
    }

    /// Returns a copy of the stored bytes, if present.
    pub fn stored(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    fn upload_error() -> ClientError {
        ClientError::Io(std::io::Error::other("injected upload failure"))
    }
}

#[async_trait::async_trait]
impl StorageClient for InMemoryClient {
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state.operations.push(Operation::Put(key.to_string()));
        if state.fail_uploads {
            return Err(Self::upload_error());
        }
        state
            .objects
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }

    async fn start_resumable(&self, bucket: &str, key: &str) -> ClientResult<Box<dyn WriteSession>> {
        Ok(Box::new(InMemoryWriteSession {
            client: self.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            buffer: BytesMut::new(),
        }))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> ClientResult<PayloadStream> {
        let mut state = self.state.lock().unwrap();
        state.operations.push(Operation::Get(key.to_string()));
        let Some(bytes) = state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
        else {
            return Err(ClientError::NotFound(key.to_string()));
        };
        drop(state);

        let mut chunks = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let end = (offset + READ_CHUNK).min(bytes.len());
            chunks.push(Ok(bytes.slice(offset..end)));
            offset = end;
        }

        Ok(futures_util::stream::iter(chunks).boxed())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state.operations.push(Operation::Delete(key.to_string()));
        state.objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[derive(Debug)]
struct InMemoryWriteSession {
    client: InMemoryClient,
    bucket: String,
    key: String,
    buffer: BytesMut,
}

#[async_trait::async_trait]
impl WriteSession for InMemoryWriteSession {
    async fn write(&mut self, chunk: Bytes) -> ClientResult<()> {
        if self.client.state.lock().unwrap().fail_uploads {
            return Err(InMemoryClient::upload_error());
        }
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn close(self: Box<Self>) -> ClientResult<()> {
        let mut state = self.client.state.lock().unwrap();
        state.operations.push(Operation::Put(self.key.clone()));
        if state.fail_uploads {
            return Err(InMemoryClient::upload_error());
        }
        state
            .objects
            .insert((self.bucket, self.key), self.buffer.freeze());
        Ok(())
    }
}
