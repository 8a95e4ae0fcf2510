//! In-process transport. The [`ServerHandle`] plays the service side.

use super::{EVENT_CHANNEL_CAPACITY, Transport, TransportEvent};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct Link {
    events: Option<mpsc::Sender<TransportEvent>>,
    opens: usize,
}

pub struct MemoryTransport {
    link: Arc<Mutex<Link>>,
    sent: mpsc::UnboundedSender<Value>,
}

/// The far end of a [`MemoryTransport`].
pub struct ServerHandle {
    link: Arc<Mutex<Link>>,
    sent: mpsc::UnboundedReceiver<Value>,
}

impl MemoryTransport {
    pub fn pair() -> (MemoryTransport, ServerHandle) {
        let link = Arc::new(Mutex::new(Link::default()));
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        (
            MemoryTransport {
                link: link.clone(),
                sent: sent_tx,
            },
            ServerHandle {
                link,
                sent: sent_rx,
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut link = self.link.lock();
        link.events = Some(tx);
        link.opens += 1;
        Ok(rx)
    }

    async fn send(&mut self, frame: Value) -> Result<()> {
        if self.link.lock().events.is_none() {
            return Err(Error::Connection("memory transport is not open".to_string()));
        }
        self.sent
            .send(frame)
            .map_err(|_| Error::Connection("server handle dropped".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.link.lock().events = None;
        Ok(())
    }
}

impl ServerHandle {
    /// Pushes an event to the client. Returns `false` when the link is not open.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let events = self.link.lock().events.clone();
        match events {
            Some(events) => events.send(event).await.is_ok(),
            None => false,
        }
    }

    pub async fn push(&self, frame: Value) -> bool {
        self.emit(TransportEvent::Frame(frame)).await
    }

    pub async fn reconnecting(&self, reason: &str) -> bool {
        self.emit(TransportEvent::Reconnecting(reason.to_string()))
            .await
    }

    pub async fn reconnected(&self, connection_id: Option<String>) -> bool {
        self.emit(TransportEvent::Reconnected(connection_id)).await
    }

    /// Sends `Closed` and drops the link, as a server-side disconnect would.
    pub async fn close(&self, reason: &str) -> bool {
        let delivered = self.emit(TransportEvent::Closed(reason.to_string())).await;
        self.link.lock().events = None;
        delivered
    }

    /// Next frame the client sent, in send order.
    pub async fn next_sent(&mut self) -> Option<Value> {
        self.sent.recv().await
    }

    /// A frame the client already sent, without waiting.
    pub fn try_next_sent(&mut self) -> Option<Value> {
        self.sent.try_recv().ok()
    }

    pub fn is_open(&self) -> bool {
        self.link.lock().events.is_some()
    }

    /// How many times the client opened the link.
    pub fn opens(&self) -> usize {
        self.link.lock().opens
    }
}
