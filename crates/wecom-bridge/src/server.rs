use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::bridge::{Bridge, InboundMessage};
use crate::crypto::MsgCrypt;

/// Shared state of the callback endpoint.
#[derive(Clone)]
pub struct CallbackState {
    crypt: Arc<MsgCrypt>,
    bridge: Arc<Bridge>,
}

impl CallbackState {
    pub fn new(crypt: MsgCrypt, bridge: Arc<Bridge>) -> Self {
        Self {
            crypt: Arc::new(crypt),
            bridge,
        }
    }
}

/// Query parameters WeCom appends to every callback request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CallbackQuery {
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
    pub echostr: String,
}

impl CallbackQuery {
    fn is_complete(&self) -> bool {
        !self.msg_signature.is_empty() && !self.timestamp.is_empty() && !self.nonce.is_empty()
    }
}

/// `GET /` answers the URL check, `POST /` receives messages.
pub fn router(state: CallbackState) -> Router {
    Router::new()
        .route("/", get(verify_url).post(receive_message))
        .with_state(state)
}

/// Serves the callback endpoint until the listener fails.
pub async fn serve(addr: SocketAddr, state: CallbackState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "wecom callback server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn verify_url(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if !query.is_complete() || query.echostr.is_empty() {
        warn!(?query, "url verification with missing parameters");
        return StatusCode::BAD_REQUEST.into_response();
    }
    match state.crypt.verify_url(
        &query.msg_signature,
        &query.timestamp,
        &query.nonce,
        &query.echostr,
    ) {
        Ok(echo) => {
            info!("callback url verified");
            echo.into_response()
        }
        Err(err) => {
            error!(error = %err, "url verification failed");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

async fn receive_message(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Response {
    if !query.is_complete() {
        warn!(?query, "message callback with missing parameters");
        return StatusCode::BAD_REQUEST.into_response();
    }
    let xml = match state.crypt.decrypt_message(
        &body,
        &query.msg_signature,
        &query.timestamp,
        &query.nonce,
    ) {
        Ok(xml) => xml,
        Err(err) => {
            error!(error = %err, "message decrypt failed");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    let message = match InboundMessage::from_xml(&xml) {
        Ok(message) => message,
        Err(err) => {
            error!(error = %err, xml = %xml, "message parse failed");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    info!(
        msg_id = message.msg_id,
        user = %message.from_user,
        agent_id = message.agent_id,
        msg_type = %message.msg_type,
        "message received"
    );
    // WeCom retries callbacks that take longer than a few seconds.
    state.bridge.spawn_inbound(message);
    StatusCode::OK.into_response()
}
