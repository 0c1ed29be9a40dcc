use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://qyapi.weixin.qq.com";

/// Seconds within which WeCom drops a repeated identical message.
pub const DUPLICATE_CHECK_INTERVAL: u32 = 1800;

const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum WecomError {
    #[error("wecom http error: {0}")]
    Http(String),
    #[error("wecom api error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("wecom response decode error: {0}")]
    Decode(String),
}

/// Credentials and endpoint of one WeCom application.
#[derive(Clone, Debug)]
pub struct WecomConfig {
    pub corp_id: String,
    pub app_secret: String,
    pub api_base: String,
}

impl WecomConfig {
    pub fn new(corp_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            corp_id: corp_id.into(),
            app_secret: app_secret.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Clone, Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn new(value: String, expires_in: u64, now: Instant) -> Self {
        let lifetime = Duration::from_secs(expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        Self {
            value,
            expires_at: now + lifetime,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

#[derive(Debug, Serialize)]
struct TextContent<'a> {
    content: &'a str,
}

/// Body of `message/send` for markdown or text messages.
#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    touser: &'a str,
    msgtype: &'static str,
    agentid: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    markdown: Option<TextContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<TextContent<'a>>,
    duplicate_check_interval: u32,
}

impl<'a> OutboundMessage<'a> {
    fn markdown(touser: &'a str, agentid: i64, content: &'a str) -> Self {
        Self {
            touser,
            msgtype: "markdown",
            agentid,
            markdown: Some(TextContent { content }),
            text: None,
            duplicate_check_interval: DUPLICATE_CHECK_INTERVAL,
        }
    }

    fn text(touser: &'a str, agentid: i64, content: &'a str) -> Self {
        Self {
            touser,
            msgtype: "text",
            agentid,
            markdown: None,
            text: Some(TextContent { content }),
            duplicate_check_interval: DUPLICATE_CHECK_INTERVAL,
        }
    }
}

/// WeCom application message API client with a cached access token.
pub struct WecomClient {
    http: reqwest::Client,
    config: WecomConfig,
    token: RwLock<Option<CachedToken>>,
}

impl WecomClient {
    pub fn new(config: WecomConfig) -> Result<Self, WecomError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WecomError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            token: RwLock::new(None),
        })
    }

    /// Returns the cached access token, fetching a new one once it expired.
    pub async fn access_token(&self) -> Result<String, WecomError> {
        if let Some(token) = self.token.read().await.as_ref()
            && token.is_fresh(Instant::now())
        {
            return Ok(token.value.clone());
        }

        let mut guard = self.token.write().await;
        if let Some(token) = guard.as_ref()
            && token.is_fresh(Instant::now())
        {
            return Ok(token.value.clone());
        }
        let fetched = self.fetch_token().await?;
        let value = fetched.value.clone();
        *guard = Some(fetched);
        Ok(value)
    }

    async fn fetch_token(&self) -> Result<CachedToken, WecomError> {
        let url = format!("{}/cgi-bin/gettoken", self.config.api_base);
        debug!(url = %url, "fetching wecom access token");
        let response = self
            .http
            .get(&url)
            .query(&[
                ("corpid", self.config.corp_id.as_str()),
                ("corpsecret", self.config.app_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| WecomError::Http(format!("gettoken request failed: {e}")))?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| WecomError::Decode(e.to_string()))?;
        if body.errcode != 0 {
            return Err(WecomError::Api {
                code: body.errcode,
                message: body.errmsg,
            });
        }
        info!(expires_in = body.expires_in, "wecom access token refreshed");
        Ok(CachedToken::new(
            body.access_token,
            body.expires_in,
            Instant::now(),
        ))
    }

    pub async fn send_markdown(
        &self,
        touser: &str,
        agent_id: i64,
        content: &str,
    ) -> Result<(), WecomError> {
        self.send(&OutboundMessage::markdown(touser, agent_id, content))
            .await
    }

    pub async fn send_text(
        &self,
        touser: &str,
        agent_id: i64,
        content: &str,
    ) -> Result<(), WecomError> {
        self.send(&OutboundMessage::text(touser, agent_id, content))
            .await
    }

    async fn send(&self, message: &OutboundMessage<'_>) -> Result<(), WecomError> {
        let token = self.access_token().await?;
        let url = format!("{}/cgi-bin/message/send", self.config.api_base);
        let response = self
            .http
            .post(&url)
            .query(&[("access_token", token.as_str())])
            .json(message)
            .send()
            .await
            .map_err(|e| WecomError::Http(format!("message/send request failed: {e}")))?;
        let body: SendResponse = response
            .json()
            .await
            .map_err(|e| WecomError::Decode(e.to_string()))?;
        if body.errcode != 0 {
            return Err(WecomError::Api {
                code: body.errcode,
                message: body.errmsg,
            });
        }
        debug!(touser = message.touser, msgtype = message.msgtype, "wecom message sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::collections::HashMap;

    use axum::Router;
    use axum::extract::Query;
    use axum::routing::{get, post};
    use axum::Json;
    use tokio::net::TcpListener;

    #[test]
    fn token_expires_ten_seconds_early() {
        let now = Instant::now();
        let token = CachedToken::new("t".into(), 7200, now);
        assert!(token.is_fresh(now + Duration::from_secs(7189)));
        assert!(!token.is_fresh(now + Duration::from_secs(7190)));
        let short = CachedToken::new("t".into(), 5, now);
        assert!(!short.is_fresh(now));
    }

    #[test]
    fn markdown_body_matches_wire_format() {
        let body = serde_json::to_value(OutboundMessage::markdown("zhangsan", 1000002, "**hi**"))
            .expect("json");
        assert_eq!(
            body,
            serde_json::json!({
                "touser": "zhangsan",
                "msgtype": "markdown",
                "agentid": 1000002,
                "markdown": { "content": "**hi**" },
                "duplicate_check_interval": 1800
            })
        );
        let text = serde_json::to_value(OutboundMessage::text("u", 1, "hi")).expect("json");
        assert_eq!(text["msgtype"], "text");
        assert_eq!(text["text"]["content"], "hi");
        assert!(text.get("markdown").is_none());
    }

    #[test]
    fn api_base_drops_trailing_slash() {
        let config = WecomConfig::new("corp", "secret").api_base("http://localhost:1/");
        assert_eq!(config.api_base, "http://localhost:1");
    }

    /// Starts a mock WeCom API and returns its base URL and gettoken counter.
    async fn fake_wecom(send_errcode: i64) -> (String, Arc<AtomicUsize>) {
        let token_calls = Arc::new(AtomicUsize::new(0));
        let calls = token_calls.clone();
        let app = Router::new()
            .route(
                "/cgi-bin/gettoken",
                get(move |Query(params): Query<HashMap<String, String>>| {
                    let calls = calls.clone();
                    async move {
                        assert_eq!(params.get("corpid").map(String::as_str), Some("corp"));
                        calls.fetch_add(1, Ordering::SeqCst);
                        Json(serde_json::json!({
                            "errcode": 0,
                            "errmsg": "ok",
                            "access_token": "tok",
                            "expires_in": 7200
                        }))
                    }
                }),
            )
            .route(
                "/cgi-bin/message/send",
                post(move || async move {
                    Json(serde_json::json!({ "errcode": send_errcode, "errmsg": "denied" }))
                }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}"), token_calls)
    }

    #[tokio::test]
    async fn token_is_reused_until_expiry() {
        let (base, token_calls) = fake_wecom(0).await;
        let client =
            WecomClient::new(WecomConfig::new("corp", "secret").api_base(base)).expect("client");
        client.send_markdown("u", 1, "a").await.expect("first send");
        client.send_text("u", 1, "b").await.expect("second send");
        assert_eq!(client.access_token().await.expect("token"), "tok");
        assert_eq!(token_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nonzero_errcode_is_api_error() {
        let (base, _) = fake_wecom(60020).await;
        let client =
            WecomClient::new(WecomConfig::new("corp", "secret").api_base(base)).expect("client");
        let err = client
            .send_markdown("u", 1, "a")
            .await
            .expect_err("send should fail");
        assert!(matches!(err, WecomError::Api { code: 60020, .. }));
    }
}
