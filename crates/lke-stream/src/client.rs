use std::sync::Arc;

use tracing::info;

use crate::config::LkeClientConfig;
use crate::errors::ClientError;
use crate::query::QueryRequest;
use crate::stream::ChunkStream;
use crate::transport::{HttpTransport, StreamTransport};

/// Entry point for sending queries and consuming their chunked answers.
#[derive(Clone)]
pub struct LkeClient {
    transport: Arc<dyn StreamTransport>,
    config: LkeClientConfig,
}

impl LkeClient {
    /// Creates a client posting to the configured HTTP endpoint.
    pub fn new(config: LkeClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = HttpTransport::new(
            config.endpoint.clone(),
            config.connect_timeout,
            config.timeout,
        )?;
        Ok(Self {
            transport: Arc::new(transport),
            config,
        })
    }

    /// Creates a client from `TENCENT_CLOUD_LKE_APP_KEY` / `LKE_SSE_URL`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(LkeClientConfig::from_env()?)
    }

    /// Creates a client over a custom transport.
    pub fn with_transport(
        config: LkeClientConfig,
        transport: Arc<dyn StreamTransport>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        Ok(Self { transport, config })
    }

    pub fn config(&self) -> &LkeClientConfig {
        &self.config
    }

    /// Builds the request body for one query with a fresh session id.
    pub fn build_query(
        &self,
        visitor_biz_id: &str,
        content: &str,
    ) -> Result<QueryRequest, ClientError> {
        if visitor_biz_id.trim().is_empty() {
            return Err(ClientError::Validation(
                "visitor_biz_id must not be empty".into(),
            ));
        }
        if content.trim().is_empty() {
            return Err(ClientError::Validation("content must not be empty".into()));
        }
        Ok(QueryRequest::new(
            self.config.bot_app_key.clone(),
            visitor_biz_id,
            content,
            self.config.streaming_throttle,
        ))
    }

    /// Sends a query and returns the stream of its answer chunks.
    ///
    /// Must be called from within a Tokio runtime; the decoding runs as its
    /// own task. Connection failures are logged by that task and surface as
    /// an empty stream.
    pub fn send_query(
        &self,
        visitor_biz_id: &str,
        content: &str,
    ) -> Result<ChunkStream, ClientError> {
        let query = self.build_query(visitor_biz_id, content)?;
        info!(
            session_id = %query.session_id,
            visitor_biz_id = %query.visitor_biz_id,
            content = %query.content,
            "sending query to LKE"
        );
        Ok(ChunkStream::spawn(
            self.transport.clone(),
            query,
            self.config.buffer_capacity,
        ))
    }
}
