//! The connection session.
//!
//! [`VoxtaClient`] owns the transport, runs the authenticate handshake and
//! exposes the command surface. Every command that has a recognizable effect
//! also has an `*_and_wait` form built on [`VoxtaClient::request`]: the reply
//! wait is registered on the bus before the command is sent, so a fast reply
//! cannot be missed.
//!
//! Each successful `connect` creates a fresh [`EventBus`]. When the link
//! closes the bus is shut down, which fails every outstanding wait with
//! [`Error::Connection`], and the chat registry is cleared.

use crate::{
    audio::AudioInputStream,
    bus::{EventBus, WaitOptions},
    chat::{Chat, ChatEvent, ChatTracker},
    config::{ClientConfig, ConfigError},
    error::{Error, Result},
    transport::{HubTransport, Transport, TransportEvent},
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::{
    sync::{Mutex as AsyncMutex, broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, error, info, instrument, warn};
use voxta_types::{
    ClientMessage, Guid, ServerMessage,
    client::{
        AddChatParticipant, Authenticate, CharacterSpeechRequest, DeleteChat, DeleteMessage,
        Interrupt, LoadCharactersList, LoadChatsList, LoadScenariosList, PauseChat,
        RemoveChatParticipant, RequestSuggestions, ResumeChat, Retry, Revert, SendMessage, Speak,
        SpeechPlaybackComplete, SpeechPlaybackStart, StartChat, StopChat, SubscribeToChat,
        TriggerAction, TypingEnd, TypingStart, UnsubscribeFromChat, UpdateContext, UpdateMessage,
    },
    server::{ChatFlow, ChatPaused, ChatStarted, ContextUpdated, ReplyCancelled, ReplyStart, Welcome},
    shared::{AudioInputSpecifications, CharactersListItem, ChatParticipantInfo, ChatsListItem, ScenarioInfo},
};

const CONNECTION_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Ready,
    Reconnecting,
}

/// Lifecycle signals. Whether to re-authenticate or restart chats after one is up to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected { reason: String },
    Reconnecting { reason: String },
    Reconnected { connection_id: Option<String> },
}

struct State {
    phase: ConnectionPhase,
    bus: Option<EventBus>,
    user: Option<ChatParticipantInfo>,
    receive_task: Option<JoinHandle<()>>,
    /// Bumped on every connect and teardown so a stale receive loop cannot touch a newer link.
    generation: u64,
}

struct Shared {
    config: ClientConfig,
    transport: AsyncMutex<Box<dyn Transport>>,
    /// Held for the whole of `connect`, so concurrent calls run one after another.
    connecting: AsyncMutex<()>,
    state: Mutex<State>,
    events: broadcast::Sender<ConnectionEvent>,
    chats: ChatTracker,
}

impl Shared {
    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    fn on_reconnecting(&self, generation: u64, reason: String) {
        if !self.config.reconnect {
            self.on_closed(generation, reason);
            return;
        }
        let bus = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            if state.phase == ConnectionPhase::Ready {
                state.phase = ConnectionPhase::Reconnecting;
            }
            state.bus.clone()
        };
        warn!(%reason, "Link lost, transport is reconnecting");
        if let Some(bus) = bus {
            bus.fail_pending(&reason);
        }
        self.emit(ConnectionEvent::Reconnecting { reason });
    }

    fn on_reconnected(&self, generation: u64, connection_id: Option<String>) {
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            if state.phase == ConnectionPhase::Reconnecting {
                state.phase = ConnectionPhase::Ready;
            }
        }
        info!(?connection_id, "Transport reconnected");
        self.emit(ConnectionEvent::Reconnected { connection_id });
    }

    fn on_closed(&self, generation: u64, reason: String) {
        let bus = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.generation += 1;
            state.phase = ConnectionPhase::Disconnected;
            state.user = None;
            state.receive_task = None;
            state.bus.take()
        };
        warn!(%reason, "Connection closed");
        if let Some(bus) = bus {
            bus.shutdown(&reason);
        }
        self.chats.clear();
        self.emit(ConnectionEvent::Disconnected { reason });
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(task) = self.state.get_mut().receive_task.take() {
            task.abort();
        }
    }
}

/// Drains one connection's transport events, in order, into its bus.
async fn receive_loop(
    shared: Weak<Shared>,
    bus: EventBus,
    generation: u64,
    mut events: mpsc::Receiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Frame(frame) => {
                bus.publish(&frame);
            }
            TransportEvent::Reconnecting(reason) => match shared.upgrade() {
                Some(shared) => shared.on_reconnecting(generation, reason),
                None => return,
            },
            TransportEvent::Reconnected(connection_id) => match shared.upgrade() {
                Some(shared) => shared.on_reconnected(generation, connection_id),
                None => return,
            },
            TransportEvent::Closed(reason) => {
                if let Some(shared) = shared.upgrade() {
                    shared.on_closed(generation, reason);
                }
                return;
            }
        }
    }
    if let Some(shared) = shared.upgrade() {
        shared.on_closed(generation, "transport event stream ended".to_string());
    }
}

macro_rules! reply_as {
    ($reply:expr, $variant:ident) => {
        match $reply {
            ServerMessage::$variant(payload) => Ok(payload),
            other => Err(Error::Server {
                message: format!("Unexpected {} reply", other.kind()),
                code: None,
            }),
        }
    };
}

/// A client session with the service. Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct VoxtaClient {
    shared: Arc<Shared>,
}

impl VoxtaClient {
    pub fn new(config: ClientConfig, transport: Box<dyn Transport>) -> Self {
        let (events, _) = broadcast::channel(CONNECTION_EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                transport: AsyncMutex::new(transport),
                connecting: AsyncMutex::new(()),
                state: Mutex::new(State {
                    phase: ConnectionPhase::Disconnected,
                    bus: None,
                    user: None,
                    receive_task: None,
                    generation: 0,
                }),
                events,
                chats: ChatTracker::new(),
            }),
        }
    }

    /// A client using the WebSocket hub transport at `config.base_url`.
    pub fn connect_to(config: ClientConfig) -> Self {
        let transport = HubTransport::from_config(&config);
        Self::new(config, Box::new(transport))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.shared.state.lock().phase
    }

    /// The authenticated user, once `welcome` has been received.
    pub fn user(&self) -> Option<ChatParticipantInfo> {
        self.shared.state.lock().user.clone()
    }

    pub fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    pub fn chat_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.chats.subscribe()
    }

    pub fn chat(&self, session_id: Guid) -> Option<Chat> {
        self.shared.chats.chat(session_id)
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.shared.chats.chats()
    }

    /// The current connection's bus, for custom subscriptions and waits.
    pub fn bus(&self) -> Result<EventBus> {
        let state = self.shared.state.lock();
        state.bus.clone().ok_or(Error::NotConnected { phase: state.phase })
    }

    /// Opens the transport.
    ///
    /// Returns at once when the link is already open. A call made while
    /// another is opening the link waits for it and shares its outcome, or
    /// retries if it failed. Fails with `NotConnected` while the transport is
    /// reconnecting.
    #[instrument(skip_all)]
    pub async fn connect(&self) -> Result<()> {
        let _connecting = self.shared.connecting.lock().await;
        {
            let mut state = self.shared.state.lock();
            match state.phase {
                ConnectionPhase::Disconnected => state.phase = ConnectionPhase::Connecting,
                ConnectionPhase::Reconnecting => {
                    return Err(Error::NotConnected {
                        phase: ConnectionPhase::Reconnecting,
                    });
                }
                phase => {
                    debug!(?phase, "Already connected");
                    return Ok(());
                }
            }
        }

        let mut transport = self.shared.transport.lock().await;
        let events = match transport.open().await {
            Ok(events) => events,
            Err(e) => {
                self.shared.state.lock().phase = ConnectionPhase::Disconnected;
                error!(error = %e, "Failed to open transport");
                return Err(match e {
                    Error::Connection(_) => e,
                    other => Error::Connection(other.to_string()),
                });
            }
        };

        let bus = EventBus::new();
        let generation = {
            let mut state = self.shared.state.lock();
            if state.phase == ConnectionPhase::Connecting {
                state.generation += 1;
                state.phase = ConnectionPhase::Connected;
                state.bus = Some(bus.clone());
                Some(state.generation)
            } else {
                None
            }
        };
        let Some(generation) = generation else {
            let _ = transport.close().await;
            return Err(Error::Connection(
                "Disconnected while the transport was opening".to_string(),
            ));
        };
        drop(transport);

        self.shared.chats.attach(&bus);
        let task = tokio::spawn(receive_loop(
            Arc::downgrade(&self.shared),
            bus,
            generation,
            events,
        ));
        {
            let mut state = self.shared.state.lock();
            if state.generation == generation {
                state.receive_task = Some(task);
            }
        }

        info!(base_url = %self.shared.config.base_url, "Connected");
        self.shared.emit(ConnectionEvent::Connected);
        Ok(())
    }

    /// Authenticates with the identity from the client's configuration.
    pub async fn authenticate(&self) -> Result<Welcome> {
        let config = &self.shared.config;
        self.authenticate_with(Authenticate {
            client: config.client_name.clone(),
            client_version: config.client_version.clone(),
            scope: config.scope.clone(),
            capabilities: config.capabilities.clone(),
        })
        .await
    }

    /// Sends `authenticate` and waits for `welcome`, `authenticationRequired` or `error`.
    ///
    /// On failure the session goes back to `Connected`, so authentication can
    /// be retried on the same link.
    #[instrument(skip_all, fields(client = %auth.client))]
    pub async fn authenticate_with(&self, auth: Authenticate) -> Result<Welcome> {
        if auth.client.trim().is_empty() {
            return Err(
                ConfigError::InvalidSetting("client name", "must not be empty".to_string()).into(),
            );
        }

        let bus = {
            let mut state = self.shared.state.lock();
            match (state.phase, state.bus.clone()) {
                (ConnectionPhase::Connected | ConnectionPhase::Ready, Some(bus)) => {
                    state.phase = ConnectionPhase::Authenticating;
                    bus
                }
                (phase, _) => return Err(Error::NotConnected { phase }),
            }
        };

        let pending = bus.wait_for(
            |message| {
                matches!(
                    message,
                    ServerMessage::Welcome(_)
                        | ServerMessage::AuthenticationRequired(_)
                        | ServerMessage::Error(_)
                )
            },
            WaitOptions::timeout(self.shared.config.auth_timeout),
        );
        let outcome = match self.transmit(auth.into()).await {
            Ok(()) => pending.wait().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(ServerMessage::Welcome(welcome)) => {
                {
                    let mut state = self.shared.state.lock();
                    if state.phase == ConnectionPhase::Authenticating {
                        state.phase = ConnectionPhase::Ready;
                    }
                    state.user = Some(welcome.user.clone());
                }
                info!(user = %welcome.user.name, server = ?welcome.voxta_server_version, "Authenticated");
                Ok(welcome)
            }
            Ok(ServerMessage::AuthenticationRequired(_)) => {
                self.leave_authenticating();
                warn!("Service requires authentication setup before this client can proceed");
                Err(Error::AuthenticationRequired)
            }
            Ok(ServerMessage::Error(e)) => {
                self.leave_authenticating();
                error!(message = %e.message, code = ?e.code, "Authentication rejected");
                Err(Error::Server {
                    message: e.message,
                    code: e.code,
                })
            }
            Ok(other) => {
                self.leave_authenticating();
                reply_as!(other, Welcome)
            }
            Err(e) => {
                self.leave_authenticating();
                Err(e)
            }
        }
    }

    fn leave_authenticating(&self) {
        let mut state = self.shared.state.lock();
        if state.phase == ConnectionPhase::Authenticating {
            state.phase = ConnectionPhase::Connected;
        }
    }

    pub async fn connect_and_authenticate(&self) -> Result<Welcome> {
        self.connect().await?;
        self.authenticate().await
    }

    /// Closes the link from any phase. Calling it again is a no-op.
    #[instrument(skip_all)]
    pub async fn disconnect(&self) {
        let (bus, task, previous) = {
            let mut state = self.shared.state.lock();
            let previous = state.phase;
            if previous == ConnectionPhase::Disconnected {
                return;
            }
            state.phase = ConnectionPhase::Disconnected;
            state.generation += 1;
            state.user = None;
            (state.bus.take(), state.receive_task.take(), previous)
        };

        if let Some(task) = task {
            task.abort();
        }
        if let Err(e) = self.shared.transport.lock().await.close().await {
            debug!(error = %e, "Transport close failed");
        }
        if let Some(bus) = bus {
            bus.shutdown("disconnected by client");
        }
        self.shared.chats.clear();

        info!(from = ?previous, "Disconnected");
        self.shared.emit(ConnectionEvent::Disconnected {
            reason: "disconnected by client".to_string(),
        });
    }

    /// Sends one command. Fails with `NotConnected` unless the session is `Ready`.
    pub async fn send(&self, command: impl Into<ClientMessage>) -> Result<()> {
        self.ready_bus()?;
        self.transmit(command.into()).await
    }

    async fn transmit(&self, command: ClientMessage) -> Result<()> {
        let frame = serde_json::to_value(&command)?;
        debug!(command = command.kind(), "Sending command");
        self.shared.transport.lock().await.send(frame).await
    }

    fn ready_bus(&self) -> Result<EventBus> {
        let state = self.shared.state.lock();
        match (state.phase, &state.bus) {
            (ConnectionPhase::Ready, Some(bus)) => Ok(bus.clone()),
            (phase, _) => Err(Error::NotConnected { phase }),
        }
    }

    /// Registers a wait for the first message `predicate` accepts, then sends `command`.
    pub async fn request<P>(
        &self,
        command: impl Into<ClientMessage>,
        predicate: P,
        options: WaitOptions,
    ) -> Result<ServerMessage>
    where
        P: Fn(&ServerMessage) -> bool + Send + 'static,
    {
        let bus = self.ready_bus()?;
        let command = command.into();
        let pending = bus.wait_for(predicate, options);
        debug!(command = command.kind(), "Awaiting correlated reply");
        self.transmit(command).await?;
        pending.wait().await
    }

    /// Like [`request`](Self::request), but a `chatSessionError` for the
    /// session also ends the wait, as [`Error::Session`].
    async fn request_in_session<P>(
        &self,
        session_id: Guid,
        command: impl Into<ClientMessage>,
        predicate: P,
        options: WaitOptions,
    ) -> Result<ServerMessage>
    where
        P: Fn(&ServerMessage) -> bool + Send + 'static,
    {
        let reply = self
            .request(
                command,
                move |message| {
                    predicate(message)
                        || matches!(message, ServerMessage::ChatSessionError(e) if e.session_id == session_id)
                },
                options,
            )
            .await?;
        match reply {
            ServerMessage::ChatSessionError(e) => {
                let retryable = e.is_retryable();
                Err(Error::Session {
                    session_id,
                    message: e.message,
                    retryable,
                })
            }
            other => Ok(other),
        }
    }

    /// Starts a chat. With `chat_id` set only that chat's `chatStarted` matches;
    /// without it the first new chat does.
    pub async fn start_chat_and_wait(&self, start: StartChat, options: WaitOptions) -> Result<ChatStarted> {
        let expected = start.chat_id;
        let reply = self
            .request(
                start,
                move |message| {
                    matches!(message, ServerMessage::ChatStarted(started)
                        if expected.is_none_or(|chat_id| chat_id == started.chat_id))
                },
                options,
            )
            .await?;
        reply_as!(reply, ChatStarted)
    }

    pub async fn resume_chat_and_wait(&self, resume: ResumeChat, options: WaitOptions) -> Result<ChatStarted> {
        let chat_id = resume.chat_id;
        let reply = self
            .request(
                resume,
                move |message| {
                    matches!(message, ServerMessage::ChatStarted(started) if started.chat_id == chat_id)
                },
                options,
            )
            .await?;
        reply_as!(reply, ChatStarted)
    }

    pub async fn pause_chat_and_wait(&self, session_id: Guid, pause: bool, options: WaitOptions) -> Result<ChatPaused> {
        let reply = self
            .request_in_session(
                session_id,
                PauseChat { session_id, pause },
                move |message| {
                    matches!(message, ServerMessage::ChatPaused(paused)
                        if paused.session_id == session_id && paused.paused == pause)
                },
                options,
            )
            .await?;
        reply_as!(reply, ChatPaused)
    }

    /// Interrupts the reply being generated and waits for its `replyCancelled`.
    pub async fn interrupt_and_wait(&self, session_id: Guid, options: WaitOptions) -> Result<ReplyCancelled> {
        let reply = self
            .request_in_session(
                session_id,
                Interrupt { session_id },
                move |message| {
                    matches!(message, ServerMessage::ReplyCancelled(cancelled) if cancelled.session_id == session_id)
                },
                options,
            )
            .await?;
        reply_as!(reply, ReplyCancelled)
    }

    /// Regenerates the last reply and waits for the new one to start.
    pub async fn retry_and_wait(&self, session_id: Guid, options: WaitOptions) -> Result<ReplyStart> {
        let reply = self
            .request_in_session(
                session_id,
                Retry { session_id },
                move |message| {
                    matches!(message, ServerMessage::ReplyStart(start) if start.session_id == session_id)
                },
                options,
            )
            .await?;
        reply_as!(reply, ReplyStart)
    }

    /// Reverts the chat and waits for the session's next `chatFlow`.
    pub async fn revert_and_wait(
        &self,
        session_id: Guid,
        message_id: Option<Guid>,
        options: WaitOptions,
    ) -> Result<ChatFlow> {
        let reply = self
            .request_in_session(
                session_id,
                Revert {
                    session_id,
                    message_id,
                },
                move |message| {
                    matches!(message, ServerMessage::ChatFlow(flow) if flow.session_id == session_id)
                },
                options,
            )
            .await?;
        reply_as!(reply, ChatFlow)
    }

    pub async fn update_context_and_wait(&self, update: UpdateContext, options: WaitOptions) -> Result<ContextUpdated> {
        let session_id = update.session_id;
        let reply = self
            .request_in_session(
                session_id,
                update,
                move |message| {
                    matches!(message, ServerMessage::ContextUpdated(context) if context.session_id == session_id)
                },
                options,
            )
            .await?;
        reply_as!(reply, ContextUpdated)
    }

    pub async fn load_characters_list_and_wait(&self, options: WaitOptions) -> Result<Vec<CharactersListItem>> {
        let reply = self
            .request(
                LoadCharactersList::default(),
                |message| matches!(message, ServerMessage::CharactersListLoaded(_)),
                options,
            )
            .await?;
        reply_as!(reply, CharactersListLoaded).map(|loaded| loaded.characters)
    }

    pub async fn load_scenarios_list_and_wait(&self, options: WaitOptions) -> Result<Vec<ScenarioInfo>> {
        let reply = self
            .request(
                LoadScenariosList::default(),
                |message| matches!(message, ServerMessage::ScenariosListLoaded(_)),
                options,
            )
            .await?;
        reply_as!(reply, ScenariosListLoaded).map(|loaded| loaded.scenarios)
    }

    pub async fn load_chats_list_and_wait(
        &self,
        character_id: Guid,
        scenario_id: Option<Guid>,
        options: WaitOptions,
    ) -> Result<Vec<ChatsListItem>> {
        let reply = self
            .request(
                LoadChatsList {
                    character_id,
                    scenario_id,
                },
                |message| matches!(message, ServerMessage::ChatsListLoaded(_)),
                options,
            )
            .await?;
        reply_as!(reply, ChatsListLoaded).map(|loaded| loaded.chats)
    }

    pub async fn send_text(&self, session_id: Guid, text: impl Into<String>) -> Result<()> {
        self.send(SendMessage::text(session_id, text)).await
    }

    pub async fn send_message(&self, message: SendMessage) -> Result<()> {
        self.send(message).await
    }

    /// Stops a chat. The chat is closed and dropped from tracking once the command is sent.
    pub async fn stop_chat(&self, session_id: Guid) -> Result<()> {
        self.send(StopChat {
            session_id: Some(session_id),
        })
        .await?;
        self.shared.chats.close(session_id);
        Ok(())
    }

    pub async fn delete_chat(&self, chat_id: Guid) -> Result<()> {
        self.send(DeleteChat { chat_id }).await
    }

    pub async fn subscribe_to_chat(&self, session_id: Guid) -> Result<()> {
        self.send(SubscribeToChat { session_id }).await
    }

    pub async fn unsubscribe_from_chat(&self, session_id: Guid) -> Result<()> {
        self.send(UnsubscribeFromChat { session_id }).await
    }

    pub async fn pause_chat(&self, session_id: Guid, pause: bool) -> Result<()> {
        self.send(PauseChat { session_id, pause }).await
    }

    pub async fn interrupt(&self, session_id: Guid) -> Result<()> {
        self.send(Interrupt { session_id }).await
    }

    pub async fn retry(&self, session_id: Guid) -> Result<()> {
        self.send(Retry { session_id }).await
    }

    pub async fn revert(&self, session_id: Guid, message_id: Option<Guid>) -> Result<()> {
        self.send(Revert {
            session_id,
            message_id,
        })
        .await
    }

    pub async fn update_context(&self, update: UpdateContext) -> Result<()> {
        self.send(update).await
    }

    pub async fn update_message(&self, session_id: Guid, message_id: Guid, text: impl Into<String>) -> Result<()> {
        self.send(UpdateMessage {
            session_id,
            message_id,
            text: Some(text.into()),
        })
        .await
    }

    pub async fn delete_message(&self, session_id: Guid, message_id: Guid) -> Result<()> {
        self.send(DeleteMessage {
            session_id,
            message_id,
        })
        .await
    }

    pub async fn speak(&self, session_id: Guid, message_id: Option<Guid>) -> Result<()> {
        self.send(Speak {
            session_id,
            message_id,
        })
        .await
    }

    pub async fn trigger_action(&self, action: TriggerAction) -> Result<()> {
        self.send(action).await
    }

    pub async fn character_speech_request(
        &self,
        session_id: Guid,
        character_id: Option<Guid>,
        text: impl Into<String>,
    ) -> Result<()> {
        self.send(CharacterSpeechRequest {
            session_id,
            character_id,
            text: text.into(),
        })
        .await
    }

    pub async fn speech_playback_start(&self, playback: SpeechPlaybackStart) -> Result<()> {
        self.send(playback).await
    }

    pub async fn speech_playback_complete(&self, session_id: Guid, message_id: Guid) -> Result<()> {
        self.send(SpeechPlaybackComplete {
            session_id,
            message_id,
        })
        .await
    }

    pub async fn typing_start(&self, session_id: Guid) -> Result<()> {
        self.send(TypingStart { session_id }).await
    }

    pub async fn typing_end(&self, session_id: Guid, sent: bool) -> Result<()> {
        self.send(TypingEnd { session_id, sent }).await
    }

    pub async fn add_chat_participant(
        &self,
        session_id: Guid,
        character_id: Guid,
        role: Option<String>,
    ) -> Result<()> {
        self.send(AddChatParticipant {
            session_id,
            character_id,
            role,
        })
        .await
    }

    pub async fn remove_chat_participant(&self, session_id: Guid, character_id: Guid) -> Result<()> {
        self.send(RemoveChatParticipant {
            session_id,
            character_id,
        })
        .await
    }

    pub async fn request_suggestions(
        &self,
        session_id: Guid,
        prefix: Option<String>,
        count: Option<u32>,
    ) -> Result<()> {
        self.send(RequestSuggestions {
            session_id,
            prefix,
            count,
        })
        .await
    }

    /// Opens the audio upload side channel for an open chat.
    pub async fn audio_input(
        &self,
        session_id: Guid,
        specs: &AudioInputSpecifications,
    ) -> Result<AudioInputStream> {
        if !self.shared.chats.is_open(session_id) {
            return Err(Error::UnknownSession(session_id));
        }
        let mut stream = AudioInputStream::new(&self.shared.config, session_id)?;
        stream.connect(specs).await?;
        Ok(stream)
    }
}
