//! The duplex link under a session.
//!
//! A [`Transport`] delivers whole JSON frames in order and reports its own
//! lifecycle on the same channel, so a frame that arrived before a close is
//! always seen before the close.

pub mod hub;
pub mod memory;

use crate::error::{Error, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    handshake::client::Request,
    http::{HeaderName, HeaderValue, header::AUTHORIZATION},
};

pub use hub::{HubTransport, TokenSource};
pub use memory::{MemoryTransport, ServerHandle};

/// Capacity of the inbound event channel handed out by `open`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something the transport observed on the inbound side.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Frame(Value),
    /// The link dropped and the transport is trying to restore it.
    Reconnecting(String),
    /// The link is back; carries the new connection id when the transport has one.
    Reconnected(Option<String>),
    /// The link is gone for good. No events follow.
    Closed(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the link and returns the ordered stream of inbound events.
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Transmits one frame.
    async fn send(&mut self, frame: Value) -> Result<()>;

    /// Closes the link. Closing an already closed transport succeeds.
    async fn close(&mut self) -> Result<()>;
}

/// Derives a WebSocket URL from the service's HTTP(S) origin.
pub fn websocket_url(base_url: &str, path: &str) -> Result<String> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(Error::Connection(format!(
            "'{}' is not an http(s) or ws(s) URL",
            base_url
        )));
    };
    Ok(format!("{}/{}", ws_base, path.trim_start_matches('/')))
}

/// Formats an `Authorization` header value, adding the `Bearer` scheme when absent.
pub fn bearer(token: &str) -> String {
    let token = token.trim();
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {}", token)
    }
}

/// Builds a WebSocket upgrade request carrying `headers` and, when given, a bearer token.
pub fn upgrade_request(
    url: &str,
    headers: &[(String, String)],
    access_token: Option<&SecretString>,
) -> Result<Request> {
    let mut request = url.into_client_request()?;
    for (name, value) in headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::Connection(format!("'{}' is not a valid header name", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::Connection(format!("header {} has an invalid value", name)))?;
        request.headers_mut().insert(header, value);
    }
    if let Some(token) = access_token {
        let value = HeaderValue::from_str(&bearer(token.expose_secret())).map_err(|_| {
            Error::Connection("access token is not a valid header value".to_string())
        })?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}
