use std::sync::Arc;

use crate::wecom::{WecomClient, WecomError};

/// Destination for the messages a session produces.
///
/// `agent_id` is the application the inbound message was addressed to; the
/// reply is sent from the same application.
#[async_trait::async_trait]
pub trait ChunkSink: Send + Sync {
    /// Delivers one answer chunk as a markdown message.
    async fn send_markdown(&self, user: &str, agent_id: i64, content: &str)
    -> Result<(), WecomError>;

    /// Delivers a plain text notice.
    async fn send_text(&self, user: &str, agent_id: i64, content: &str) -> Result<(), WecomError>;
}

/// Sends messages through the WeCom message API.
pub struct WecomSink {
    client: Arc<WecomClient>,
}

impl WecomSink {
    pub fn new(client: Arc<WecomClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ChunkSink for WecomSink {
    async fn send_markdown(
        &self,
        user: &str,
        agent_id: i64,
        content: &str,
    ) -> Result<(), WecomError> {
        self.client.send_markdown(user, agent_id, content).await
    }

    async fn send_text(&self, user: &str, agent_id: i64, content: &str) -> Result<(), WecomError> {
        self.client.send_text(user, agent_id, content).await
    }
}

/// Prints messages to stdout, separated by a rule.
#[derive(Default)]
pub struct StdoutSink;

#[async_trait::async_trait]
impl ChunkSink for StdoutSink {
    async fn send_markdown(
        &self,
        user: &str,
        agent_id: i64,
        content: &str,
    ) -> Result<(), WecomError> {
        println!("[agent {agent_id} -> {user}]\n{content}\n---");
        Ok(())
    }

    async fn send_text(&self, user: &str, agent_id: i64, content: &str) -> Result<(), WecomError> {
        println!("[agent {agent_id} -> {user}] {content}\n---");
        Ok(())
    }
}
