use async_trait::async_trait;
use mockall::mock;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tokio::sync::{Notify, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use voxta_realtime::{
    ChatEvent, ChatPhase, ClientConfig, ConnectionEvent, ConnectionPhase, Error, ReplyOutcome,
    VoxtaClient, WaitOptions,
    transport::{MemoryTransport, ServerHandle, Transport, TransportEvent},
    voxta_types::{
        client::{ContextPayload, LoadScenariosList, ResumeChat, StartChat, UpdateContext},
        server::ServerMessage,
        shared::{ChatFlowState, ChatMessageRole},
    },
};

mock! {
    pub Link {}

    #[async_trait]
    impl Transport for Link {
        async fn open(&mut self) -> voxta_realtime::Result<mpsc::Receiver<TransportEvent>>;
        async fn send(&mut self, frame: Value) -> voxta_realtime::Result<()>;
        async fn close(&mut self) -> voxta_realtime::Result<()>;
    }
}

/// Holds `open` until the test lets it through.
struct GatedTransport {
    inner: MemoryTransport,
    gate: Arc<Notify>,
}

#[async_trait]
impl Transport for GatedTransport {
    async fn open(&mut self) -> voxta_realtime::Result<mpsc::Receiver<TransportEvent>> {
        self.gate.notified().await;
        self.inner.open().await
    }

    async fn send(&mut self, frame: Value) -> voxta_realtime::Result<()> {
        self.inner.send(frame).await
    }

    async fn close(&mut self) -> voxta_realtime::Result<()> {
        self.inner.close().await
    }
}

fn welcome() -> Value {
    json!({
        "$type": "welcome",
        "voxtaServerVersion": "1.0.0",
        "user": { "id": Uuid::new_v4(), "name": "Sam" },
    })
}

fn chat_started(session_id: Uuid, chat_id: Uuid) -> Value {
    json!({
        "$type": "chatStarted",
        "sessionId": session_id,
        "chatId": chat_id,
        "characters": [{ "id": Uuid::new_v4(), "name": "Aria" }],
        "context": { "sessionId": session_id, "flags": [] },
    })
}

async fn connected_client(config: ClientConfig) -> (VoxtaClient, ServerHandle) {
    let (transport, server) = MemoryTransport::pair();
    let client = VoxtaClient::new(config, Box::new(transport));
    client.connect().await.expect("memory transport should open");
    (client, server)
}

async fn ready_client() -> (VoxtaClient, ServerHandle) {
    let (client, mut server) = connected_client(ClientConfig::default()).await;
    let auth = tokio::spawn({
        let client = client.clone();
        async move { client.authenticate().await }
    });
    let sent = server.next_sent().await.unwrap();
    assert_eq!(sent["$type"], "authenticate");
    server.push(welcome()).await;
    auth.await.unwrap().expect("welcome should authenticate");
    (client, server)
}

async fn next_event(events: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("connection event should arrive")
        .expect("event channel should be open")
}

#[tokio::test]
async fn test_authenticate_welcome_reaches_ready() {
    let (client, mut server) = connected_client(ClientConfig::default()).await;
    assert_eq!(client.phase(), ConnectionPhase::Connected);

    let auth = tokio::spawn({
        let client = client.clone();
        async move { client.authenticate().await }
    });
    let sent = server.next_sent().await.unwrap();
    assert_eq!(sent["$type"], "authenticate");
    assert_eq!(sent["client"], "voxta-rust-client");
    assert_eq!(sent["scope"], json!(["role:app"]));

    // Frames outside the vocabulary are skipped on the way to the reply.
    server.push(json!({ "$type": "someFutureEvent" })).await;
    server.push(welcome()).await;

    let welcome = auth.await.unwrap().unwrap();
    assert_eq!(welcome.user.name, "Sam");
    assert_eq!(client.phase(), ConnectionPhase::Ready);
    assert_eq!(client.user().map(|user| user.name), Some("Sam".to_string()));
}

#[tokio::test]
async fn test_authentication_required_can_be_retried_without_reconnect() {
    let (client, mut server) = connected_client(ClientConfig::default()).await;

    let auth = tokio::spawn({
        let client = client.clone();
        async move { client.authenticate().await }
    });
    server.next_sent().await.unwrap();
    server.push(json!({ "$type": "authenticationRequired" })).await;
    assert!(matches!(auth.await.unwrap(), Err(Error::AuthenticationRequired)));
    assert_eq!(client.phase(), ConnectionPhase::Connected);

    let auth = tokio::spawn({
        let client = client.clone();
        async move { client.authenticate().await }
    });
    server.next_sent().await.unwrap();
    server.push(welcome()).await;
    assert!(auth.await.unwrap().is_ok());
    assert_eq!(client.phase(), ConnectionPhase::Ready);
    assert_eq!(server.opens(), 1);
}

#[tokio::test]
async fn test_authenticate_error_reply_is_server_error() {
    let (client, mut server) = connected_client(ClientConfig::default()).await;

    let auth = tokio::spawn({
        let client = client.clone();
        async move { client.authenticate().await }
    });
    server.next_sent().await.unwrap();
    server
        .push(json!({ "$type": "error", "message": "Unsupported client", "code": "E42" }))
        .await;

    match auth.await.unwrap() {
        Err(Error::Server { message, code }) => {
            assert_eq!(message, "Unsupported client");
            assert_eq!(code.as_deref(), Some("E42"));
        }
        other => panic!("Expected server error, got {:?}", other),
    }
    assert_eq!(client.phase(), ConnectionPhase::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_authenticate_times_out_at_configured_budget() {
    let mut config = ClientConfig::default();
    config.auth_timeout = Duration::from_secs(5);
    let (client, _server) = connected_client(config).await;

    let start = tokio::time::Instant::now();
    let result = client.authenticate().await;
    assert!(matches!(result, Err(Error::Timeout)));
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert_eq!(client.phase(), ConnectionPhase::Connected);
}

#[tokio::test]
async fn test_start_chat_waits_for_its_own_chat_id() {
    let (client, mut server) = ready_client().await;
    let (wanted, other) = (Uuid::new_v4(), Uuid::new_v4());
    let session = Uuid::new_v4();

    let start = tokio::spawn({
        let client = client.clone();
        async move {
            let mut command = StartChat::with_character(Uuid::new_v4());
            command.chat_id = Some(wanted);
            client.start_chat_and_wait(command, WaitOptions::default()).await
        }
    });
    let sent = server.next_sent().await.unwrap();
    assert_eq!(sent["$type"], "startChat");
    assert_eq!(sent["chatId"], json!(wanted));

    server.push(chat_started(Uuid::new_v4(), other)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!start.is_finished(), "a different chat must not resolve the wait");

    server.push(chat_started(session, wanted)).await;
    let started = start.await.unwrap().unwrap();
    assert_eq!(started.chat_id, wanted);
    assert_eq!(started.session_id, session);
    assert_eq!(started.characters[0].name, "Aria");
}

#[tokio::test]
async fn test_resume_chat_tracks_active_session() {
    let (client, mut server) = ready_client().await;
    let (chat_id, session) = (Uuid::new_v4(), Uuid::new_v4());

    let resume = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .resume_chat_and_wait(ResumeChat::new(chat_id), WaitOptions::default())
                .await
        }
    });
    let sent = server.next_sent().await.unwrap();
    assert_eq!(sent, json!({ "$type": "resumeChat", "chatId": chat_id }));

    server
        .push(json!({ "$type": "chatStarting", "sessionId": session, "chatId": chat_id }))
        .await;
    server.push(chat_started(session, chat_id)).await;
    resume.await.unwrap().unwrap();

    let chat = client.chat(session).expect("chat should be tracked");
    assert_eq!(chat.phase, ChatPhase::Active);
    assert_eq!(chat.chat_id, Some(chat_id));

    client.stop_chat(session).await.unwrap();
    assert_eq!(server.next_sent().await.unwrap()["$type"], "stopChat");
    assert!(client.chat(session).is_none());
    assert!(client.chats().is_empty());
}

#[tokio::test]
async fn test_commands_before_ready_fail_with_not_connected() {
    let (transport, _server) = MemoryTransport::pair();
    let client = VoxtaClient::new(ClientConfig::default(), Box::new(transport));

    let result = client
        .start_chat_and_wait(StartChat::default(), WaitOptions::default())
        .await;
    assert!(matches!(
        result,
        Err(Error::NotConnected {
            phase: ConnectionPhase::Disconnected
        })
    ));
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (transport, server) = MemoryTransport::pair();
    let client = VoxtaClient::new(ClientConfig::default(), Box::new(transport));
    let mut events = client.connection_events();

    client.disconnect().await;
    assert_eq!(client.phase(), ConnectionPhase::Disconnected);

    client.connect().await.unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    client.disconnect().await;
    client.disconnect().await;

    assert_eq!(client.phase(), ConnectionPhase::Disconnected);
    assert!(!server.is_open());
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected { .. }
    ));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_connect_twice_opens_once() {
    let (client, server) = connected_client(ClientConfig::default()).await;
    client.connect().await.unwrap();
    assert_eq!(server.opens(), 1);
    assert_eq!(client.phase(), ConnectionPhase::Connected);
}

#[tokio::test]
async fn test_concurrent_connect_waits_for_the_open_in_progress() {
    let (inner, server) = MemoryTransport::pair();
    let gate = Arc::new(Notify::new());
    let transport = GatedTransport {
        inner,
        gate: gate.clone(),
    };
    let client = VoxtaClient::new(ClientConfig::default(), Box::new(transport));

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.phase(), ConnectionPhase::Connecting);

    let second = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!first.is_finished());
    assert!(!second.is_finished(), "connect must not report success before the link is open");

    gate.notify_one();
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    assert_eq!(client.phase(), ConnectionPhase::Connected);
    assert_eq!(server.opens(), 1);
}

#[tokio::test]
async fn test_transport_close_fails_in_flight_waits() {
    let (client, mut server) = ready_client().await;
    let session = Uuid::new_v4();
    server.push(chat_started(session, Uuid::new_v4())).await;

    let bus = client.bus().unwrap();
    let load = tokio::spawn({
        let client = client.clone();
        async move { client.load_characters_list_and_wait(WaitOptions::forever()).await }
    });
    assert_eq!(server.next_sent().await.unwrap()["$type"], "loadCharactersList");

    server.close("server went away").await;
    match load.await.unwrap() {
        Err(Error::Connection(reason)) => assert_eq!(reason, "server went away"),
        other => panic!("Expected connection error, got {:?}", other),
    }
    assert_eq!(client.phase(), ConnectionPhase::Disconnected);
    assert!(client.chats().is_empty());
    assert!(bus.is_closed());
    assert_eq!(bus.pending_waits(), 0);
}

#[tokio::test]
async fn test_reconnecting_fails_waits_and_returns_to_ready() {
    let (client, mut server) = ready_client().await;
    let mut events = client.connection_events();
    let session = Uuid::new_v4();

    let pause = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .pause_chat_and_wait(session, true, WaitOptions::forever())
                .await
        }
    });
    assert_eq!(server.next_sent().await.unwrap()["$type"], "pauseChat");

    server.reconnecting("network blip").await;
    assert!(matches!(pause.await.unwrap(), Err(Error::Connection(_))));
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Reconnecting { .. }
    ));
    assert_eq!(client.phase(), ConnectionPhase::Reconnecting);
    assert!(matches!(
        client.connect().await,
        Err(Error::NotConnected {
            phase: ConnectionPhase::Reconnecting
        })
    ));
    assert_eq!(server.opens(), 1);

    server.reconnected(Some("conn-2".to_string())).await;
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Reconnected {
            connection_id: Some("conn-2".to_string())
        }
    );
    assert_eq!(client.phase(), ConnectionPhase::Ready);
}

#[tokio::test]
async fn test_session_error_ends_chat_scoped_wait() {
    let (client, mut server) = ready_client().await;
    let session = Uuid::new_v4();

    let pause = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .pause_chat_and_wait(session, true, WaitOptions::default())
                .await
        }
    });
    server.next_sent().await.unwrap();
    server
        .push(json!({ "$type": "chatPaused", "sessionId": Uuid::new_v4(), "paused": true }))
        .await;
    server
        .push(json!({
            "$type": "chatSessionError",
            "sessionId": session,
            "message": "Service busy",
            "retry": true,
        }))
        .await;

    match pause.await.unwrap() {
        Err(Error::Session {
            session_id,
            message,
            retryable,
        }) => {
            assert_eq!(session_id, session);
            assert_eq!(message, "Service busy");
            assert!(retryable);
        }
        other => panic!("Expected session error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_streamed_reply_surfaces_through_chat_events() {
    let (client, server) = ready_client().await;
    let mut chat_events = client.chat_events();
    let (session, message) = (Uuid::new_v4(), Uuid::new_v4());

    server.push(chat_started(session, Uuid::new_v4())).await;
    server
        .push(json!({ "$type": "replyStart", "sessionId": session, "messageId": message, "senderId": Uuid::new_v4() }))
        .await;
    for text in ["a", "b"] {
        server
            .push(json!({ "$type": "replyChunk", "sessionId": session, "messageId": message, "text": text, "audioUrl": format!("/tts/{}.wav", text) }))
            .await;
    }
    server
        .push(json!({ "$type": "replyEnd", "sessionId": session, "messageId": message }))
        .await;

    let reply = loop {
        let event = tokio::time::timeout(Duration::from_secs(5), chat_events.recv())
            .await
            .expect("reply should complete")
            .unwrap();
        if let ChatEvent::ReplyCompleted(reply) = event {
            break reply;
        }
    };
    assert_eq!(reply.text, "ab");
    assert_eq!(reply.outcome, ReplyOutcome::Ended);
    assert_eq!(reply.audio_urls().collect::<Vec<_>>(), vec!["/tts/a.wav", "/tts/b.wav"]);
}

#[tokio::test]
async fn test_open_failure_is_connection_error() {
    let mut link = MockLink::new();
    link.expect_open().times(1).returning(|| {
        Err(Error::WebSocket(
            tokio_tungstenite::tungstenite::Error::ConnectionClosed,
        ))
    });
    let client = VoxtaClient::new(ClientConfig::default(), Box::new(link));

    let result = client.connect().await;
    assert!(matches!(result, Err(Error::Connection(_))));
    assert_eq!(client.phase(), ConnectionPhase::Disconnected);
}

#[tokio::test]
async fn test_send_failure_releases_the_wait() {
    let (events_tx, events_rx) = mpsc::channel(16);
    let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();
    let mut calls = 0;

    let mut link = MockLink::new();
    link.expect_open().return_once(move || Ok(events_rx));
    link.expect_send().returning(move |frame| {
        calls += 1;
        let _ = sent_tx.send(frame);
        if calls == 1 {
            Ok(())
        } else {
            Err(Error::Connection("broken pipe".to_string()))
        }
    });
    link.expect_close().returning(|| Ok(()));

    let client = VoxtaClient::new(ClientConfig::default(), Box::new(link));
    client.connect().await.unwrap();
    let auth = tokio::spawn({
        let client = client.clone();
        async move { client.authenticate().await }
    });
    sent_rx.recv().await.unwrap();
    events_tx.send(TransportEvent::Frame(welcome())).await.unwrap();
    auth.await.unwrap().unwrap();

    let result = client
        .load_scenarios_list_and_wait(WaitOptions::default())
        .await;
    assert!(matches!(result, Err(Error::Connection(reason)) if reason == "broken pipe"));
    assert_eq!(client.bus().unwrap().pending_waits(), 0);

    client.disconnect().await;
}

#[tokio::test]
async fn test_resume_accepts_roles_this_build_does_not_know() {
    let (client, mut server) = ready_client().await;
    let (chat_id, session) = (Uuid::new_v4(), Uuid::new_v4());

    let resume = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .resume_chat_and_wait(ResumeChat::new(chat_id), WaitOptions::default())
                .await
        }
    });
    server.next_sent().await.unwrap();
    server
        .push(json!({
            "$type": "chatStarted",
            "sessionId": session,
            "chatId": chat_id,
            "characters": [{ "id": Uuid::new_v4(), "name": "Aria" }],
            "messages": [{
                "messageId": Uuid::new_v4(),
                "role": "Narrator",
                "senderId": Uuid::new_v4(),
                "text": "Once upon a time",
                "timestamp": "2024-05-01T10:00:00Z",
            }],
        }))
        .await;

    let started = resume.await.unwrap().unwrap();
    assert_eq!(started.messages.len(), 1);
    assert_eq!(started.messages[0].role, ChatMessageRole::Unknown);
    assert_eq!(started.messages[0].text, "Once upon a time");

    let bus = client.bus().unwrap();
    assert!(bus.publish(&json!({
        "$type": "contextUpdated",
        "sessionId": session,
        "characters": null,
        "flags": null,
    })));
}

#[tokio::test]
async fn test_interrupt_waits_for_its_own_session() {
    let (client, mut server) = ready_client().await;
    let (session, other) = (Uuid::new_v4(), Uuid::new_v4());

    let interrupt = tokio::spawn({
        let client = client.clone();
        async move { client.interrupt_and_wait(session, WaitOptions::default()).await }
    });
    assert_eq!(
        server.next_sent().await.unwrap(),
        json!({ "$type": "interrupt", "sessionId": session })
    );

    server
        .push(json!({ "$type": "replyCancelled", "sessionId": other, "messageId": Uuid::new_v4() }))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!interrupt.is_finished());

    let message = Uuid::new_v4();
    server
        .push(json!({ "$type": "replyCancelled", "sessionId": session, "messageId": message }))
        .await;
    let cancelled = interrupt.await.unwrap().unwrap();
    assert_eq!(cancelled.session_id, session);
    assert_eq!(cancelled.message_id, message);
}

#[tokio::test]
async fn test_retry_waits_for_the_next_reply_in_its_session() {
    let (client, mut server) = ready_client().await;
    let (session, other) = (Uuid::new_v4(), Uuid::new_v4());

    let retry = tokio::spawn({
        let client = client.clone();
        async move { client.retry_and_wait(session, WaitOptions::default()).await }
    });
    assert_eq!(server.next_sent().await.unwrap()["$type"], "retry");

    server
        .push(json!({ "$type": "replyStart", "sessionId": other, "messageId": Uuid::new_v4(), "senderId": Uuid::new_v4() }))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!retry.is_finished());

    let message = Uuid::new_v4();
    server
        .push(json!({ "$type": "replyStart", "sessionId": session, "messageId": message, "senderId": Uuid::new_v4() }))
        .await;
    let start = retry.await.unwrap().unwrap();
    assert_eq!(start.message_id, message);
}

#[tokio::test]
async fn test_revert_waits_for_its_session_flow() {
    let (client, mut server) = ready_client().await;
    let (session, other, message) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let revert = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .revert_and_wait(session, Some(message), WaitOptions::default())
                .await
        }
    });
    assert_eq!(
        server.next_sent().await.unwrap(),
        json!({ "$type": "revert", "sessionId": session, "messageId": message })
    );

    server
        .push(json!({ "$type": "chatFlow", "sessionId": other, "state": "WaitingForUserInput" }))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!revert.is_finished());

    server
        .push(json!({ "$type": "chatFlow", "sessionId": session, "state": "WaitingForUserInput" }))
        .await;
    let flow = revert.await.unwrap().unwrap();
    assert_eq!(flow.state, ChatFlowState::WaitingForUserInput);
}

#[tokio::test]
async fn test_update_context_waits_for_its_session_update() {
    let (client, mut server) = ready_client().await;
    let (session, other) = (Uuid::new_v4(), Uuid::new_v4());

    let update = tokio::spawn({
        let client = client.clone();
        async move {
            let update = UpdateContext {
                session_id: session,
                context: ContextPayload {
                    set_flags: Some(vec!["raining".to_string()]),
                    ..Default::default()
                },
            };
            client
                .update_context_and_wait(update, WaitOptions::default())
                .await
        }
    });
    let sent = server.next_sent().await.unwrap();
    assert_eq!(sent["$type"], "updateContext");
    assert_eq!(sent["setFlags"], json!(["raining"]));

    server
        .push(json!({ "$type": "contextUpdated", "sessionId": other, "flags": [] }))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!update.is_finished());

    server
        .push(json!({ "$type": "contextUpdated", "sessionId": session, "flags": [{ "name": "raining" }] }))
        .await;
    let updated = update.await.unwrap().unwrap();
    assert_eq!(updated.session_id, session);
    assert_eq!(updated.flags.len(), 1);
}

#[tokio::test]
async fn test_cancelled_request_releases_its_wait() {
    let (client, mut server) = ready_client().await;
    let bus = client.bus().unwrap();
    let token = CancellationToken::new();

    let request = tokio::spawn({
        let client = client.clone();
        let options = WaitOptions::forever().with_cancel(token.clone());
        async move {
            client
                .request(
                    LoadScenariosList::default(),
                    |message| matches!(message, ServerMessage::ScenariosListLoaded(_)),
                    options,
                )
                .await
        }
    });
    assert_eq!(server.next_sent().await.unwrap()["$type"], "loadScenariosList");
    assert_eq!(bus.pending_waits(), 1);

    token.cancel();
    assert!(matches!(request.await.unwrap(), Err(Error::Cancelled)));
    assert_eq!(bus.pending_waits(), 0);
}
