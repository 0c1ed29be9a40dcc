//! Fakes shared by the bridge and callback server tests.

use std::sync::Mutex;

use lke_stream::{ByteStream, QueryRequest, StreamError, StreamTransport};

use crate::delivery::ChunkSink;
use crate::wecom::WecomError;

pub(crate) const THREE_PARAGRAPHS: &str = concat!(
    "event: reply\n",
    "data: {\"type\":\"reply\",\"payload\":{\"content\":\"第一段\\n\\n第二段\\n\\n第三段\"}}\n\n",
);

/// Answers every query with the same event-stream body.
pub(crate) struct FixedTransport(pub(crate) &'static str);

#[async_trait::async_trait]
impl StreamTransport for FixedTransport {
    async fn open(&self, _query: &QueryRequest) -> Result<ByteStream, StreamError> {
        let body = bytes::Bytes::from_static(self.0.as_bytes());
        Ok(Box::pin(futures::stream::iter(vec![Ok(body)])))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Sent {
    pub(crate) kind: &'static str,
    pub(crate) user: String,
    pub(crate) agent_id: i64,
    pub(crate) content: String,
}

/// Records deliveries; optionally fails the one whose content matches.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) sent: Mutex<Vec<Sent>>,
    pub(crate) fail_on: Option<&'static str>,
}

impl RecordingSink {
    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn contents(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.content).collect()
    }

    fn record(
        &self,
        kind: &'static str,
        user: &str,
        agent_id: i64,
        content: &str,
    ) -> Result<(), WecomError> {
        if self.fail_on == Some(content) {
            return Err(WecomError::Api {
                code: 45009,
                message: "api freq out of limit".into(),
            });
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Sent {
                kind,
                user: user.to_string(),
                agent_id,
                content: content.to_string(),
            });
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChunkSink for RecordingSink {
    async fn send_markdown(
        &self,
        user: &str,
        agent_id: i64,
        content: &str,
    ) -> Result<(), WecomError> {
        self.record("markdown", user, agent_id, content)
    }

    async fn send_text(&self, user: &str, agent_id: i64, content: &str) -> Result<(), WecomError> {
        self.record("text", user, agent_id, content)
    }
}
