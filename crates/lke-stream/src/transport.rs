use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt as _;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use tracing::debug;

use crate::errors::{ClientError, StreamError};
use crate::query::QueryRequest;

/// Raw response body, read chunk by chunk.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, StreamError>> + Send + 'static>>;

/// Opens one streaming request to the backend.
#[async_trait::async_trait]
pub trait StreamTransport: Send + Sync {
    /// Sends the query and returns the response body as a byte stream.
    async fn open(&self, query: &QueryRequest) -> Result<ByteStream, StreamError>;
}

/// HTTP transport posting queries to the LKE SSE endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Builds the transport; `timeout`, when set, also bounds body reads.
    pub fn new(
        endpoint: impl Into<String>,
        connect_timeout: Duration,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder().connect_timeout(connect_timeout);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait::async_trait]
impl StreamTransport for HttpTransport {
    async fn open(&self, query: &QueryRequest) -> Result<ByteStream, StreamError> {
        debug!(session_id = %query.session_id, endpoint = %self.endpoint, "opening event stream");
        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .header(CACHE_CONTROL, "no-cache")
            .json(query)
            .send()
            .await
            .map_err(|e| {
                StreamError::transport(format!("connect to {} failed: {e}", self.endpoint), None)
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StreamError::transport(
                format!("event stream request failed with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }

        let stream = response
            .bytes_stream()
            .map(|item| item.map_err(|e| StreamError::transport(format!("stream read failed: {e}"), None)));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt as _;

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let transport = HttpTransport::new("http://127.0.0.1:9/sse", Duration::from_secs(2), None)
            .expect("transport");
        let query = QueryRequest::new("app", "u", "hi", 1);
        let err = match transport.open(&query).await {
            Ok(_) => panic!("nothing listens on the discard port"),
            Err(err) => err,
        };
        assert!(matches!(err, StreamError::Transport { status_code: None, .. }));
    }

    #[tokio::test]
    async fn slow_body_is_read_to_the_end() {
        let app = axum::Router::new().route(
            "/sse",
            axum::routing::post(|| async {
                let parts = futures::stream::iter(["event: reply\n", "data: {}\n\n"]).then(
                    |part| async move {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        Ok::<_, std::convert::Infallible>(bytes::Bytes::from_static(
                            part.as_bytes(),
                        ))
                    },
                );
                axum::body::Body::from_stream(parts)
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let transport = HttpTransport::new(
            format!("http://{addr}/sse"),
            Duration::from_millis(200),
            None,
        )
        .expect("transport");
        let mut body = transport
            .open(&QueryRequest::new("app", "u", "hi", 1))
            .await
            .expect("open");
        let mut received = Vec::new();
        while let Some(part) = body.next().await {
            received.extend_from_slice(&part.expect("part"));
        }
        assert_eq!(received, b"event: reply\ndata: {}\n\n");
    }
}
