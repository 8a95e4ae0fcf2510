//! Audio upload side channel for one chat session.
//!
//! The stream is opened per session id: the first frame is the JSON
//! [`AudioInputSpecifications`], every later frame is raw binary audio.

use crate::{
    config::ClientConfig,
    error::{Error, Result},
    transport::{upgrade_request, websocket_url},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use secrecy::SecretString;
use tokio::{net::TcpStream, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::protocol::Message as WsMessage,
};
use tracing::{debug, info, instrument, warn};
use voxta_types::{Guid, shared::AudioInputSpecifications};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn audio_input_url(base_url: &str, session_id: Guid) -> Result<String> {
    Ok(format!(
        "{}?sessionId={}",
        websocket_url(base_url, "ws/audio/input/stream")?,
        session_id
    ))
}

pub struct AudioInputStream {
    session_id: Guid,
    url: String,
    access_token: Option<SecretString>,
    headers: Vec<(String, String)>,
    sink: Option<SplitSink<Socket, WsMessage>>,
    reader: Option<JoinHandle<()>>,
}

impl AudioInputStream {
    pub fn new(config: &ClientConfig, session_id: Guid) -> Result<Self> {
        Ok(Self {
            session_id,
            url: audio_input_url(&config.base_url, session_id)?,
            access_token: config.access_token.clone(),
            headers: config.headers.clone(),
            sink: None,
            reader: None,
        })
    }

    pub fn session_id(&self) -> Guid {
        self.session_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Connects and sends the stream's audio format. A no-op when already open.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub async fn connect(&mut self, specs: &AudioInputSpecifications) -> Result<()> {
        if self.sink.is_some() {
            return Ok(());
        }

        let request = upgrade_request(&self.url, &self.headers, self.access_token.as_ref())?;

        let (ws_stream, _) = connect_async(request).await.map_err(|e| {
            Error::Connection(format!("Failed to open audio input stream: {}", e))
        })?;
        let (mut sink, mut stream) = ws_stream.split();
        sink.send(WsMessage::Text(serde_json::to_string(specs)?.into()))
            .await?;

        let session_id = self.session_id;
        self.reader = Some(tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%session_id, error = %e, "Audio input stream error");
                        break;
                    }
                }
            }
            debug!(%session_id, "Audio input stream reader finished");
        }));
        self.sink = Some(sink);
        info!(url = %self.url, "Audio input stream open");
        Ok(())
    }

    pub async fn send_audio(&mut self, chunk: &[u8]) -> Result<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| Error::Connection("audio input stream is not open".to_string()))?;
        sink.send(WsMessage::Binary(chunk.to_vec().into())).await?;
        Ok(())
    }

    /// Closes the stream. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.send(WsMessage::Close(None)).await;
            let _ = sink.close().await;
            debug!(session_id = %self.session_id, "Audio input stream closed");
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        Ok(())
    }
}

impl Drop for AudioInputStream {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
