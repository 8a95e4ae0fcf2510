//! Per-session chat state derived from the event stream.
//!
//! A [`ChatTracker`] listens to every message on a connection's bus and keeps
//! one [`Chat`] per server-issued session id. It also assembles streamed
//! replies: a session has at most one open [`ReplyAssembly`], and a reply
//! frame carrying a different message id closes the open one as
//! [`ReplyOutcome::Superseded`] before anything is appended. Text from two
//! replies is never merged.
//!
//! A chat is forgotten once it closes. Its session id is remembered for a
//! while so that reply frames still in flight do not bring it back.

use crate::bus::{EventBus, Subscription};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use voxta_types::{
    Guid, ServerMessage,
    server::ReplyChunk,
    shared::ChatParticipantInfo,
};

const CHAT_EVENT_CAPACITY: usize = 1024;
const CLOSED_SESSION_MEMORY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    Starting,
    Active,
    Paused,
    Closed,
}

/// One `replyChunk`, as received.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyFragment {
    pub text: String,
    pub audio_url: Option<String>,
    pub start_index: Option<u32>,
    pub end_index: Option<u32>,
    pub is_narration: bool,
}

impl From<&ReplyChunk> for ReplyFragment {
    fn from(chunk: &ReplyChunk) -> Self {
        Self {
            text: chunk.text.clone(),
            audio_url: chunk.audio_url.clone(),
            start_index: chunk.start_index,
            end_index: chunk.end_index,
            is_narration: chunk.is_narration.unwrap_or(false),
        }
    }
}

/// A reply being streamed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyAssembly {
    pub message_id: Guid,
    pub sender_id: Option<Guid>,
    fragments: Vec<ReplyFragment>,
    text: String,
}

impl ReplyAssembly {
    fn new(message_id: Guid, sender_id: Option<Guid>) -> Self {
        Self {
            message_id,
            sender_id,
            fragments: Vec::new(),
            text: String::new(),
        }
    }

    fn append(&mut self, fragment: ReplyFragment) {
        self.text.push_str(&fragment.text);
        self.fragments.push(fragment);
    }

    /// Text received so far, in arrival order.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fragments(&self) -> &[ReplyFragment] {
        &self.fragments
    }

    fn complete(self, session_id: Guid, outcome: ReplyOutcome, tokens: Option<u32>) -> CompletedReply {
        CompletedReply {
            session_id,
            message_id: self.message_id,
            sender_id: self.sender_id,
            text: self.text,
            fragments: self.fragments,
            outcome,
            tokens,
        }
    }
}

/// How a reply assembly ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// `replyEnd` arrived.
    Ended,
    /// `replyCancelled` arrived, or the chat closed mid-reply.
    Cancelled,
    /// A reply with another message id started while this one was open.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedReply {
    pub session_id: Guid,
    pub message_id: Guid,
    pub sender_id: Option<Guid>,
    pub text: String,
    pub fragments: Vec<ReplyFragment>,
    pub outcome: ReplyOutcome,
    pub tokens: Option<u32>,
}

impl CompletedReply {
    pub fn audio_urls(&self) -> impl Iterator<Item = &str> {
        self.fragments
            .iter()
            .filter_map(|fragment| fragment.audio_url.as_deref())
    }
}

/// Snapshot of one chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub session_id: Guid,
    pub chat_id: Option<Guid>,
    pub phase: ChatPhase,
    pub user: Option<ChatParticipantInfo>,
    pub characters: Vec<ChatParticipantInfo>,
    /// Names of the context flags currently set.
    pub flags: Vec<String>,
    pub reply: Option<ReplyAssembly>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    PhaseChanged {
        session_id: Guid,
        phase: ChatPhase,
    },
    ReplyStarted {
        session_id: Guid,
        message_id: Guid,
        sender_id: Option<Guid>,
    },
    ReplyDelta {
        session_id: Guid,
        message_id: Guid,
        fragment: ReplyFragment,
    },
    /// Exactly one per assembly.
    ReplyCompleted(CompletedReply),
    SessionError {
        session_id: Guid,
        message: String,
        retryable: bool,
    },
}

impl Chat {
    fn new(session_id: Guid, phase: ChatPhase) -> Self {
        Self {
            session_id,
            chat_id: None,
            phase,
            user: None,
            characters: Vec::new(),
            flags: Vec::new(),
            reply: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.phase != ChatPhase::Closed
    }

    fn set_phase(&mut self, phase: ChatPhase, events: &mut Vec<ChatEvent>) {
        if self.phase != phase {
            debug!(session_id = %self.session_id, from = ?self.phase, to = ?phase, "Chat phase changed");
            self.phase = phase;
            events.push(ChatEvent::PhaseChanged {
                session_id: self.session_id,
                phase,
            });
        }
    }

    fn finish_reply(&mut self, outcome: ReplyOutcome, tokens: Option<u32>, events: &mut Vec<ChatEvent>) {
        if let Some(assembly) = self.reply.take() {
            events.push(ChatEvent::ReplyCompleted(assembly.complete(
                self.session_id,
                outcome,
                tokens,
            )));
        }
    }

    /// Returns the open assembly for `message_id`, superseding any other one.
    fn begin_reply(
        &mut self,
        message_id: Guid,
        sender_id: Option<Guid>,
        events: &mut Vec<ChatEvent>,
    ) -> &mut ReplyAssembly {
        let stale = self
            .reply
            .as_ref()
            .map(|open| open.message_id)
            .filter(|open| *open != message_id);
        if let Some(stale) = stale {
            warn!(
                session_id = %self.session_id,
                superseded = %stale,
                by = %message_id,
                "Reply superseded before it ended"
            );
            self.finish_reply(ReplyOutcome::Superseded, None, events);
        }
        if self.reply.is_none() {
            events.push(ChatEvent::ReplyStarted {
                session_id: self.session_id,
                message_id,
                sender_id,
            });
        }
        let assembly = self
            .reply
            .get_or_insert_with(|| ReplyAssembly::new(message_id, sender_id));
        if assembly.sender_id.is_none() {
            assembly.sender_id = sender_id;
        }
        assembly
    }

    /// Finishes the open assembly if it is `message_id`; anything else is stale.
    fn end_reply(
        &mut self,
        message_id: Guid,
        outcome: ReplyOutcome,
        tokens: Option<u32>,
        events: &mut Vec<ChatEvent>,
    ) {
        let is_open = self
            .reply
            .as_ref()
            .is_some_and(|open| open.message_id == message_id);
        if is_open {
            self.finish_reply(outcome, tokens, events);
        } else {
            debug!(session_id = %self.session_id, %message_id, ?outcome, "Ignoring end of unknown reply");
        }
    }

    fn close(&mut self, events: &mut Vec<ChatEvent>) {
        self.finish_reply(ReplyOutcome::Cancelled, None, events);
        self.set_phase(ChatPhase::Closed, events);
    }
}

#[derive(Default)]
struct Registry {
    chats: HashMap<Guid, Chat>,
    closed: VecDeque<Guid>,
}

impl Registry {
    /// Closes and removes a chat. Returns `false` if it was not tracked.
    fn close(&mut self, session_id: Guid, events: &mut Vec<ChatEvent>) -> bool {
        let Some(mut chat) = self.chats.remove(&session_id) else {
            return false;
        };
        chat.close(events);
        if self.closed.len() == CLOSED_SESSION_MEMORY {
            self.closed.pop_front();
        }
        self.closed.push_back(session_id);
        true
    }

    fn was_closed(&self, session_id: Guid) -> bool {
        self.closed.contains(&session_id)
    }

    fn reopen(&mut self, session_id: Guid) {
        self.closed.retain(|closed| *closed != session_id);
    }
}

fn entry<'a>(
    chats: &'a mut HashMap<Guid, Chat>,
    session_id: Guid,
    phase: ChatPhase,
    events: &mut Vec<ChatEvent>,
) -> &'a mut Chat {
    chats.entry(session_id).or_insert_with(|| {
        events.push(ChatEvent::PhaseChanged { session_id, phase });
        Chat::new(session_id, phase)
    })
}

/// Live view of every chat driven over one client.
#[derive(Clone)]
pub struct ChatTracker {
    registry: Arc<Mutex<Registry>>,
    events: broadcast::Sender<ChatEvent>,
}

impl Default for ChatTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatTracker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHAT_EVENT_CAPACITY);
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            events,
        }
    }

    /// Feeds every message on `bus` into this tracker.
    pub fn attach(&self, bus: &EventBus) -> Subscription {
        let tracker = self.clone();
        bus.subscribe_all(move |message| tracker.apply(message))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn chat(&self, session_id: Guid) -> Option<Chat> {
        self.registry.lock().chats.get(&session_id).cloned()
    }

    /// Every chat that is currently open.
    pub fn chats(&self) -> Vec<Chat> {
        self.registry.lock().chats.values().cloned().collect()
    }

    pub fn is_open(&self, session_id: Guid) -> bool {
        self.registry
            .lock()
            .chats
            .get(&session_id)
            .is_some_and(Chat::is_open)
    }

    /// Closes a chat locally, e.g. after `stopChat`. Returns `false` if it was not open.
    pub fn close(&self, session_id: Guid) -> bool {
        let mut events = Vec::new();
        let closed = self.registry.lock().close(session_id, &mut events);
        self.emit(events);
        closed
    }

    /// Closes and forgets every chat. Used when the connection goes away.
    pub fn clear(&self) {
        let mut events = Vec::new();
        {
            let mut registry = self.registry.lock();
            for chat in registry.chats.values_mut() {
                chat.close(&mut events);
            }
            registry.chats.clear();
            registry.closed.clear();
        }
        self.emit(events);
    }

    pub fn apply(&self, message: &ServerMessage) {
        let Some(session_id) = message.session_id() else {
            return;
        };
        let mut registry = self.registry.lock();
        let mut events = Vec::new();

        match message {
            ServerMessage::ChatStarting(starting) => {
                registry.reopen(session_id);
                let chat = entry(&mut registry.chats, session_id, ChatPhase::Starting, &mut events);
                chat.chat_id = Some(starting.chat_id);
            }
            ServerMessage::ChatStarted(started) => {
                registry.reopen(session_id);
                let chat = entry(&mut registry.chats, session_id, ChatPhase::Starting, &mut events);
                chat.chat_id = Some(started.chat_id);
                chat.user = started.user.clone();
                chat.characters = started.characters.clone();
                if let Some(context) = &started.context {
                    chat.flags = context.flags.iter().map(|flag| flag.name.clone()).collect();
                }
                chat.set_phase(ChatPhase::Active, &mut events);
                info!(%session_id, chat_id = %started.chat_id, "Chat started");
            }
            ServerMessage::ChatPaused(paused) => {
                if let Some(chat) = registry.chats.get_mut(&session_id) {
                    match (chat.phase, paused.paused) {
                        (ChatPhase::Active, true) => chat.set_phase(ChatPhase::Paused, &mut events),
                        (ChatPhase::Paused, false) => chat.set_phase(ChatPhase::Active, &mut events),
                        _ => {}
                    }
                }
            }
            ServerMessage::ChatClosed(_) => {
                registry.close(session_id, &mut events);
            }
            ServerMessage::ChatParticipantsUpdated(update) => {
                if let Some(chat) = registry.chats.get_mut(&session_id) {
                    chat.characters = update.characters.clone();
                }
            }
            ServerMessage::ContextUpdated(context) => {
                if let Some(chat) = registry.chats.get_mut(&session_id) {
                    chat.flags = context.flags.iter().map(|flag| flag.name.clone()).collect();
                    if !context.characters.is_empty() {
                        chat.characters = context.characters.clone();
                    }
                }
            }
            ServerMessage::ChatSessionError(error) => {
                let retryable = error.is_retryable();
                warn!(%session_id, message = %error.message, retryable, "Chat session error");
                events.push(ChatEvent::SessionError {
                    session_id,
                    message: error.message.clone(),
                    retryable,
                });
                if !retryable {
                    registry.close(session_id, &mut events);
                }
            }
            ServerMessage::ReplyStart(_) | ServerMessage::ReplyChunk(_)
                if registry.was_closed(session_id) =>
            {
                debug!(%session_id, "Dropping reply frame for a closed chat");
            }
            ServerMessage::ReplyStart(start) => {
                let chat = entry(&mut registry.chats, session_id, ChatPhase::Active, &mut events);
                chat.begin_reply(start.message_id, Some(start.sender_id), &mut events);
            }
            ServerMessage::ReplyChunk(chunk) => {
                let chat = entry(&mut registry.chats, session_id, ChatPhase::Active, &mut events);
                let fragment = ReplyFragment::from(chunk);
                chat.begin_reply(chunk.message_id, chunk.sender_id, &mut events)
                    .append(fragment.clone());
                events.push(ChatEvent::ReplyDelta {
                    session_id,
                    message_id: chunk.message_id,
                    fragment,
                });
            }
            ServerMessage::ReplyEnd(end) => {
                if let Some(chat) = registry.chats.get_mut(&session_id) {
                    chat.end_reply(end.message_id, ReplyOutcome::Ended, end.tokens, &mut events);
                }
            }
            ServerMessage::ReplyCancelled(cancelled) => {
                if let Some(chat) = registry.chats.get_mut(&session_id) {
                    chat.end_reply(cancelled.message_id, ReplyOutcome::Cancelled, None, &mut events);
                }
            }
            _ => {}
        }

        drop(registry);
        self.emit(events);
    }

    fn emit(&self, events: Vec<ChatEvent>) {
        for event in events {
            // No receivers is fine.
            let _ = self.events.send(event);
        }
    }
}
