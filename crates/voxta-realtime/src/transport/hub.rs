//! WebSocket transport speaking the JSON hub protocol used by the service.
//!
//! Every hub record is a JSON object terminated by `0x1e`. After a one-time
//! handshake, commands go out as invocations of `SendMessage` and events
//! arrive as invocations of `ReceiveMessage`, one frame per argument.

use super::{EVENT_CHANNEL_CAPACITY, Transport, TransportEvent, upgrade_request, websocket_url};
use crate::{
    config::ClientConfig,
    error::{Error, Result},
};
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, protocol::Message as WsMessage},
};
use tracing::{debug, error, info, instrument, warn};

const RECORD_SEPARATOR: char = '\u{1e}';
const HANDSHAKE: &str = r#"{"protocol":"json","version":1}"#;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const SEND_TARGET: &str = "SendMessage";
const RECEIVE_TARGET: &str = "ReceiveMessage";

const INVOCATION: u64 = 1;
const PING: u64 = 6;
const CLOSE: u64 = 7;

/// Produces the access token for each new connection, e.g. after a refresh.
pub type TokenSource = Arc<dyn Fn() -> Option<SecretString> + Send + Sync>;

pub struct HubTransport {
    base_url: String,
    access_token: Option<SecretString>,
    headers: Vec<(String, String)>,
    token_source: Option<TokenSource>,
    outgoing: Option<mpsc::Sender<WsMessage>>,
    reader: Option<JoinHandle<()>>,
}

impl HubTransport {
    pub fn new(base_url: impl Into<String>, access_token: Option<SecretString>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token,
            headers: Vec::new(),
            token_source: None,
            outgoing: None,
            reader: None,
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Asks `source` for the token on every `open`, instead of using a fixed one.
    pub fn with_token_source(mut self, source: TokenSource) -> Self {
        self.token_source = Some(source);
        self
    }

    fn current_token(&self) -> Option<SecretString> {
        match &self.token_source {
            Some(source) => source(),
            None => self.access_token.clone(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.base_url.clone(), config.access_token.clone())
            .with_headers(config.headers.clone())
    }
}

#[async_trait]
impl Transport for HubTransport {
    #[instrument(skip_all)]
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        self.close().await?;

        let url = websocket_url(&self.base_url, "hub")?;
        let token = self.current_token();
        let request = upgrade_request(&url, &self.headers, token.as_ref())?;

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| Error::Connection(format!("Failed to connect to {}: {}", url, e)))?;
        let (mut sink, mut stream) = ws_stream.split();

        sink.send(WsMessage::Text(format!("{}{}", HANDSHAKE, RECORD_SEPARATOR).into()))
            .await?;
        let leftover = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_handshake(&mut stream))
            .await
            .map_err(|_| Error::Connection("Timed out waiting for hub handshake".to_string()))??;
        info!(%url, "Connected to hub");

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        for record in leftover {
            for frame in interpret(record).frames() {
                let _ = events_tx.send(TransportEvent::Frame(frame)).await;
            }
        }

        let (outgoing_tx, outgoing_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(write_loop(sink, outgoing_rx));
        self.reader = Some(tokio::spawn(read_loop(stream, events_tx)));
        self.outgoing = Some(outgoing_tx);
        Ok(events_rx)
    }

    async fn send(&mut self, frame: Value) -> Result<()> {
        let outgoing = self
            .outgoing
            .as_ref()
            .ok_or_else(|| Error::Connection("hub transport is not open".to_string()))?;
        let record = encode_record(&invocation(frame));
        outgoing
            .send(WsMessage::Text(record.into()))
            .await
            .map_err(|_| Error::Connection("hub writer has stopped".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(outgoing) = self.outgoing.take() {
            let record = encode_record(&json!({ "type": CLOSE }));
            let _ = outgoing.send(WsMessage::Text(record.into())).await;
            debug!("Closing hub connection");
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        Ok(())
    }
}

/// A decoded hub record, reduced to what the session layer cares about.
#[derive(Debug, PartialEq)]
enum HubRecord {
    Frames(Vec<Value>),
    Ping,
    Close(Option<String>),
    Ignored,
}

impl HubRecord {
    fn frames(self) -> Vec<Value> {
        match self {
            HubRecord::Frames(frames) => frames,
            _ => Vec::new(),
        }
    }
}

fn encode_record(value: &Value) -> String {
    format!("{}{}", value, RECORD_SEPARATOR)
}

fn decode_records(text: &str) -> Vec<Value> {
    text.split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| match serde_json::from_str(record) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Dropping undecodable hub record");
                None
            }
        })
        .collect()
}

fn invocation(frame: Value) -> Value {
    json!({ "type": INVOCATION, "target": SEND_TARGET, "arguments": [frame] })
}

fn interpret(record: Value) -> HubRecord {
    match record.get("type").and_then(Value::as_u64) {
        Some(INVOCATION) if record.get("target").and_then(Value::as_str) == Some(RECEIVE_TARGET) => {
            match record.get("arguments") {
                Some(Value::Array(arguments)) => HubRecord::Frames(arguments.clone()),
                _ => HubRecord::Frames(Vec::new()),
            }
        }
        Some(PING) => HubRecord::Ping,
        Some(CLOSE) => HubRecord::Close(
            record
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
        _ => HubRecord::Ignored,
    }
}

/// Reads up to the handshake response; returns any records that arrived with it.
async fn read_handshake<S>(stream: &mut S) -> Result<Vec<Value>>
where
    S: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message? {
            WsMessage::Text(text) => {
                let mut records = decode_records(&text).into_iter();
                let response = records
                    .next()
                    .ok_or_else(|| Error::Connection("Empty hub handshake response".to_string()))?;
                if let Some(reason) = response.get("error").and_then(Value::as_str) {
                    return Err(Error::Connection(format!(
                        "Hub handshake rejected: {}",
                        reason
                    )));
                }
                return Ok(records.collect());
            }
            WsMessage::Close(_) => {
                return Err(Error::Connection(
                    "Socket closed during hub handshake".to_string(),
                ));
            }
            _ => continue,
        }
    }
    Err(Error::Connection(
        "Socket ended during hub handshake".to_string(),
    ))
}

async fn read_loop<S>(mut stream: S, events: mpsc::Sender<TransportEvent>)
where
    S: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
    let reason = 'read: loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                for record in decode_records(&text) {
                    match interpret(record) {
                        HubRecord::Frames(frames) => {
                            for frame in frames {
                                if events.send(TransportEvent::Frame(frame)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        HubRecord::Close(reason) => {
                            break 'read reason
                                .unwrap_or_else(|| "hub closed the connection".to_string());
                        }
                        HubRecord::Ping | HubRecord::Ignored => {}
                    }
                }
            }
            Some(Ok(WsMessage::Close(frame))) => {
                break frame
                    .map(|frame| frame.reason.to_string())
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or_else(|| "socket closed".to_string());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!(error = %e, "Hub socket error");
                break e.to_string();
            }
            None => break "socket stream ended".to_string(),
        }
    };
    info!(%reason, "Hub connection closed");
    let _ = events.send(TransportEvent::Closed(reason)).await;
}

async fn write_loop<S>(mut sink: S, mut outgoing: mpsc::Receiver<WsMessage>)
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    let mut keep_alive = tokio::time::interval(KEEP_ALIVE_INTERVAL);
    keep_alive.tick().await;
    loop {
        tokio::select! {
            message = outgoing.recv() => match message {
                Some(message) => {
                    if let Err(e) = sink.send(message).await {
                        error!(error = %e, "Failed to write to hub socket");
                        break;
                    }
                }
                None => break,
            },
            _ = keep_alive.tick() => {
                let ping = encode_record(&json!({ "type": PING }));
                if let Err(e) = sink.send(WsMessage::Text(ping.into())).await {
                    warn!(error = %e, "Keep-alive ping failed");
                    break;
                }
            }
        }
    }
    let _ = sink.send(WsMessage::Close(None)).await;
    let _ = sink.close().await;
}
