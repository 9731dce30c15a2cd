//! HTTP implementation of the storage client.
//!
//! The remote speaks a plain path-style REST protocol: `PUT`, `GET` and
//! `DELETE` on `{endpoint}/{bucket}/{key}`. Transports differ only in how the
//! connection is negotiated, see [`Protocol`].

use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::{ClientError, ClientResult, PayloadStream, USER_AGENT, WriteSession};

/// Protocol variant used by an [`HttpClient`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Protocol {
    /// Plain HTTP/1.1.
    Http1,
    /// HTTP/2 with prior knowledge, skipping protocol negotiation.
    Http2,
}

/// A storage client talking to the remote over HTTP.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClient {
    /// Creates a client for the given endpoint and protocol variant.
    pub fn new(endpoint: &str, protocol: Protocol) -> ClientResult<Self> {
        let builder = reqwest::Client::builder().user_agent(USER_AGENT);
        let builder = match protocol {
            Protocol::Http1 => builder.http1_only(),
            Protocol::Http2 => builder.http2_prior_knowledge(),
        };

        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.endpoint)
    }
}

fn expect_success(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::UnexpectedStatus(status))
    }
}

#[async_trait::async_trait]
impl crate::StorageClient for HttpClient {
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> ClientResult<()> {
        let response = self
            .client
            .put(self.object_url(bucket, key))
            .body(data)
            .send()
            .await?;

        expect_success(response).map(drop)
    }

    async fn start_resumable(&self, bucket: &str, key: &str) -> ClientResult<Box<dyn WriteSession>> {
        let (sender, receiver) = mpsc::channel::<std::io::Result<Bytes>>(4);
        let body = reqwest::Body::wrap_stream(ReceiverStream::new(receiver));
        let request = self.client.put(self.object_url(bucket, key)).body(body);

        // The request runs concurrently with the session so that chunks are
        // streamed out as they are written; its status surfaces on close.
        let handle = tokio::spawn(async move {
            let response = request.send().await?;
            expect_success(response).map(drop)
        });

        Ok(Box::new(HttpWriteSession {
            sender: Some(sender),
            handle,
        }))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> ClientResult<PayloadStream> {
        let response = self
            .client
            .get(self.object_url(bucket, key))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(key.to_string()));
        }
        let response = expect_success(response)?;

        Ok(response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> ClientResult<()> {
        let response = self
            .client
            .delete(self.object_url(bucket, key))
            .send()
            .await?;

        expect_success(response).map(drop)
    }
}

#[derive(Debug)]
struct HttpWriteSession {
    sender: Option<mpsc::Sender<std::io::Result<Bytes>>>,
    handle: JoinHandle<ClientResult<()>>,
}

#[async_trait::async_trait]
impl WriteSession for HttpWriteSession {
    async fn write(&mut self, chunk: Bytes) -> ClientResult<()> {
        let sender = self.sender.as_ref().ok_or(ClientError::SessionClosed)?;
        sender
            .send(Ok(chunk))
            .await
            .map_err(|_| ClientError::SessionClosed)
    }

    async fn close(mut self: Box<Self>) -> ClientResult<()> {
        // Dropping the sender signals end-of-data to the request body.
        self.sender.take();
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(ClientError::Io(std::io::Error::other(err))),
        }
    }
}
