use std::sync::Arc;

use lke_stream::{ClientError, LkeClient};
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::crypto::CryptoError;
use crate::delivery::ChunkSink;
use crate::wecom::WecomError;

pub const TEXT_ONLY_NOTICE: &str = "抱歉，目前仅支持文本输入，请尝试用文字与我交流 :-/";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Wecom(#[from] WecomError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("invalid inbound message: {0}")]
    InvalidMessage(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// A decrypted WeCom application callback message.
#[derive(Clone, Debug, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "FromUserName")]
    pub from_user: String,
    /// Application the message was sent to; replies go out from it.
    #[serde(rename = "AgentID", default)]
    pub agent_id: i64,
    #[serde(rename = "MsgType")]
    pub msg_type: String,
    #[serde(rename = "Content", default)]
    pub content: String,
    /// Absent on event callbacks.
    #[serde(rename = "MsgId", default)]
    pub msg_id: i64,
}

impl InboundMessage {
    pub fn text(from_user: impl Into<String>, agent_id: i64, content: impl Into<String>) -> Self {
        Self {
            from_user: from_user.into(),
            agent_id,
            msg_type: "text".into(),
            content: content.into(),
            msg_id: 0,
        }
    }

    /// Parses the decrypted callback XML.
    pub fn from_xml(xml: &str) -> Result<Self, BridgeError> {
        quick_xml::de::from_str(xml).map_err(|e| BridgeError::InvalidMessage(e.to_string()))
    }

    pub fn is_text(&self) -> bool {
        self.msg_type == "text"
    }
}

/// Forwards inbound messages to LKE and delivers the chunked answers.
pub struct Bridge {
    lke: LkeClient,
    sink: Arc<dyn ChunkSink>,
}

impl Bridge {
    pub fn new(lke: LkeClient, sink: Arc<dyn ChunkSink>) -> Self {
        Self { lke, sink }
    }

    /// Handles one message; returns the number of chunks delivered.
    ///
    /// Delivery failures of single chunks are logged and skipped.
    pub async fn handle_inbound(&self, message: &InboundMessage) -> Result<usize, BridgeError> {
        if !message.is_text() {
            info!(
                msg_id = message.msg_id,
                user = %message.from_user,
                msg_type = %message.msg_type,
                "non-text message"
            );
            self.sink
                .send_text(&message.from_user, message.agent_id, TEXT_ONLY_NOTICE)
                .await?;
            return Ok(0);
        }
        let content = message.content.trim();
        if content.is_empty() {
            warn!(msg_id = message.msg_id, user = %message.from_user, "empty text message ignored");
            return Ok(0);
        }

        let mut chunks = self.lke.send_query(&message.from_user, content)?;
        let session_id = chunks.session_id().to_string();
        info!(msg_id = message.msg_id, session_id = %session_id, "query started");
        let mut delivered = 0;
        while let Some(chunk) = chunks.next_chunk().await {
            match self
                .sink
                .send_markdown(&message.from_user, message.agent_id, chunk.as_str())
                .await
            {
                Ok(()) => delivered += 1,
                Err(err) => error!(
                    msg_id = message.msg_id,
                    session_id = %session_id,
                    error = %err,
                    "chunk delivery failed"
                ),
            }
        }
        info!(msg_id = message.msg_id, session_id = %session_id, delivered, "session finished");
        Ok(delivered)
    }

    /// Handles a message on its own task.
    pub fn spawn_inbound(self: &Arc<Self>, message: InboundMessage) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = bridge.handle_inbound(&message).await {
                error!(
                    msg_id = message.msg_id,
                    user = %message.from_user,
                    error = %err,
                    "inbound message failed"
                );
            }
        })
    }
}
