//! Typed event bus for one connection.
//!
//! Inbound frames are classified against the closed [`ServerMessage`] vocabulary
//! and fanned out, in registration order, to persistent subscribers and to
//! one-shot [`PendingWait`]s whose predicate accepts the message.
//!
//! A `PendingWait` is the request/reply correlation primitive: register it,
//! send the command, then await it. Exactly one of match, timeout,
//! cancellation or bus shutdown resolves it. Whoever removes the wait's entry
//! from the registry owns the resolution, so the other triggers become no-ops.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    future::IntoFuture,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use voxta_types::{ServerMessage, ServerMessageType};

/// Default time budget for a correlated reply.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

type Handler = Arc<dyn Fn(&ServerMessage) + Send + Sync>;
type Predicate = Box<dyn Fn(&ServerMessage) -> bool + Send>;
type Resolution = oneshot::Sender<Result<ServerMessage>>;

enum Entry {
    Subscriber {
        id: u64,
        filter: Option<ServerMessageType>,
        handler: Handler,
    },
    Pending {
        id: u64,
        predicate: Predicate,
        slot: Resolution,
    },
}

impl Entry {
    fn id(&self) -> u64 {
        match self {
            Entry::Subscriber { id, .. } | Entry::Pending { id, .. } => *id,
        }
    }
}

enum Delivery {
    Handler(Handler),
    Resolve(Resolution),
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
    /// Set once the bus is torn down; holds the reason given to late waiters.
    closed: Option<String>,
}

impl Registry {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn remove(&mut self, id: u64) -> Option<Entry> {
        let index = self.entries.iter().position(|entry| entry.id() == id)?;
        Some(self.entries.remove(index))
    }

    fn drain_pending(&mut self) -> Vec<Resolution> {
        let mut slots = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            match entry {
                Entry::Pending { slot, .. } => slots.push(slot),
                subscriber => kept.push(subscriber),
            }
        }
        self.entries = kept;
        slots
    }
}

/// How long a [`PendingWait`] may take and what can abort it.
#[derive(Clone, Debug)]
pub struct WaitOptions {
    /// `None` or zero waits forever.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_WAIT_TIMEOUT),
            cancel: None,
        }
    }
}

impl WaitOptions {
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }

    pub fn forever() -> Self {
        Self {
            timeout: None,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn deadline(&self) -> Option<Instant> {
        self.timeout
            .filter(|timeout| !timeout.is_zero())
            .map(|timeout| Instant::now() + timeout)
    }
}

/// Fan-out dispatcher for inbound frames. Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies a raw frame and dispatches it.
    ///
    /// Returns `false` when the frame is not a protocol message; such frames
    /// are dropped without error.
    pub fn publish(&self, frame: &Value) -> bool {
        match ServerMessage::classify(frame) {
            Some(message) => {
                self.dispatch(message);
                true
            }
            None => {
                trace!("Ignoring frame outside the protocol vocabulary");
                false
            }
        }
    }

    /// Delivers an already classified message. Returns the number of deliveries made.
    ///
    /// Predicates run while the registry is locked and must not call back into
    /// the bus. Handlers run after the lock is released, against a snapshot,
    /// so they may subscribe or cancel freely.
    pub fn dispatch(&self, message: ServerMessage) -> usize {
        let kind = message.kind();
        let deliveries = {
            let mut registry = self.registry.lock();
            if registry.closed.is_some() {
                return 0;
            }
            let mut deliveries = Vec::new();
            let mut index = 0;
            while index < registry.entries.len() {
                let resolves = match &registry.entries[index] {
                    Entry::Subscriber {
                        filter, handler, ..
                    } => {
                        if filter.is_none_or(|filter| filter == kind) {
                            deliveries.push(Delivery::Handler(handler.clone()));
                        }
                        false
                    }
                    Entry::Pending { predicate, .. } => predicate(&message),
                };
                if resolves {
                    if let Entry::Pending { slot, .. } = registry.entries.remove(index) {
                        deliveries.push(Delivery::Resolve(slot));
                    }
                } else {
                    index += 1;
                }
            }
            deliveries
        };

        debug!(%kind, deliveries = deliveries.len(), "Dispatching message");
        let count = deliveries.len();
        for delivery in deliveries {
            match delivery {
                Delivery::Handler(handler) => handler(&message),
                Delivery::Resolve(slot) => {
                    let _ = slot.send(Ok(message.clone()));
                }
            }
        }
        count
    }

    /// Registers a persistent handler for one discriminator.
    pub fn subscribe<F>(&self, kind: ServerMessageType, handler: F) -> Subscription
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.register_subscriber(Some(kind), Arc::new(handler))
    }

    /// Registers a persistent handler for every recognized message.
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.register_subscriber(None, Arc::new(handler))
    }

    /// Forwards matching messages into a channel, for callers that prefer a stream.
    pub fn subscribe_channel(
        &self,
        kind: Option<ServerMessageType>,
    ) -> (Subscription, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: Handler = Arc::new(move |message: &ServerMessage| {
            let _ = tx.send(message.clone());
        });
        (self.register_subscriber(kind, handler), rx)
    }

    fn register_subscriber(&self, filter: Option<ServerMessageType>, handler: Handler) -> Subscription {
        let mut registry = self.registry.lock();
        let id = registry.allocate_id();
        if registry.closed.is_none() {
            registry.entries.push(Entry::Subscriber {
                id,
                filter,
                handler,
            });
        }
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Registers a one-shot wait for the first message accepted by `predicate`.
    ///
    /// Registration happens before this returns, so a command sent afterwards
    /// cannot have its reply slip past the wait.
    pub fn wait_for<P>(&self, predicate: P, options: WaitOptions) -> PendingWait
    where
        P: Fn(&ServerMessage) -> bool + Send + 'static,
    {
        let (slot, receiver) = oneshot::channel();
        let mut registry = self.registry.lock();
        let id = registry.allocate_id();
        match &registry.closed {
            Some(reason) => {
                let _ = slot.send(Err(Error::Connection(reason.clone())));
            }
            None => registry.entries.push(Entry::Pending {
                id,
                predicate: Box::new(predicate),
                slot,
            }),
        }
        drop(registry);

        PendingWait {
            id,
            registry: Arc::downgrade(&self.registry),
            receiver,
            deadline: options.deadline(),
            cancel: options.cancel,
        }
    }

    /// [`wait_for`](Self::wait_for) restricted to one discriminator.
    pub fn wait_for_type<P>(
        &self,
        kind: ServerMessageType,
        predicate: P,
        options: WaitOptions,
    ) -> PendingWait
    where
        P: Fn(&ServerMessage) -> bool + Send + 'static,
    {
        self.wait_for(
            move |message| message.kind() == kind && predicate(message),
            options,
        )
    }

    /// Fails every outstanding wait with a connection error, keeping subscribers.
    pub fn fail_pending(&self, reason: &str) -> usize {
        let slots = self.registry.lock().drain_pending();
        let count = slots.len();
        for slot in slots {
            let _ = slot.send(Err(Error::Connection(reason.to_string())));
        }
        if count > 0 {
            debug!(count, reason, "Failed outstanding waits");
        }
        count
    }

    /// Tears the bus down: outstanding waits fail, subscribers are dropped and
    /// later registrations fail immediately.
    pub fn shutdown(&self, reason: &str) {
        let slots = {
            let mut registry = self.registry.lock();
            if registry.closed.is_some() {
                return;
            }
            registry.closed = Some(reason.to_string());
            let slots = registry.drain_pending();
            registry.entries.clear();
            slots
        };
        debug!(failed_waits = slots.len(), reason, "Event bus shut down");
        for slot in slots {
            let _ = slot.send(Err(Error::Connection(reason.to_string())));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed.is_some()
    }

    pub fn pending_waits(&self) -> usize {
        self.registry
            .lock()
            .entries
            .iter()
            .filter(|entry| matches!(entry, Entry::Pending { .. }))
            .count()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .entries
            .iter()
            .filter(|entry| matches!(entry, Entry::Subscriber { .. }))
            .count()
    }
}

/// Handle to a persistent subscription.
///
/// Dropping the handle leaves the subscription in place; call
/// [`cancel`](Self::cancel) to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Removes exactly this subscriber. Safe to call more than once.
    pub fn cancel(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(self.id);
        }
    }
}

/// A registered one-shot wait. Await it with [`wait`](Self::wait) or `.await`.
///
/// Dropping it without awaiting removes the registration.
pub struct PendingWait {
    id: u64,
    registry: Weak<Mutex<Registry>>,
    receiver: oneshot::Receiver<Result<ServerMessage>>,
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl PendingWait {
    pub async fn wait(mut self) -> Result<ServerMessage> {
        let cancel = self.cancel.take();
        let deadline = self.deadline;

        let outcome = {
            let cancelled = async {
                match &cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending().await,
                }
            };
            let expired = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                biased;
                resolved = &mut self.receiver => return flatten(resolved),
                _ = cancelled => Error::Cancelled,
                _ = expired => Error::Timeout,
            }
        };

        if self.disarm() {
            debug!(id = self.id, error = %outcome, "Wait ended without a match");
            Err(outcome)
        } else {
            // A match or a shutdown claimed the entry first; its result is already in flight.
            flatten((&mut self.receiver).await)
        }
    }

    /// Removes the registration. Returns `true` if this call removed it.
    fn disarm(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.lock().remove(self.id).is_some(),
            None => false,
        }
    }
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl IntoFuture for PendingWait {
    type Output = Result<ServerMessage>;
    type IntoFuture = BoxFuture<'static, Result<ServerMessage>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

fn flatten(
    resolved: std::result::Result<Result<ServerMessage>, oneshot::error::RecvError>,
) -> Result<ServerMessage> {
    match resolved {
        Ok(result) => result,
        Err(_) => Err(Error::Connection("event bus dropped".to_string())),
    }
}
