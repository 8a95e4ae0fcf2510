//! Events pushed by the service to the client.
//!
//! The set of recognized `$type` discriminators is closed. Frames carrying any
//! other discriminator are not protocol messages and [`ServerMessage::classify`]
//! returns `None` for them without complaint, so newer services can add event
//! types without breaking older clients.

use crate::shared::{
    ActionInvocationArgument, CharactersListItem, ChatFlowState, ChatMessage, ChatMessageRole,
    ChatParticipantInfo, ChatSessionInfo, ChatsListItem, ComputerVisionSource, FlagInfo, Guid,
    ScenarioInfo, null_as_default,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, fmt};
use tracing::warn;

/// Name of the discriminator field on every frame.
pub const TYPE_FIELD: &str = "$type";

macro_rules! server_messages {
    ($($(#[$meta:meta])* $variant:ident($payload:ident) => $tag:literal),* $(,)?) => {
        /// Every event the client understands, tagged with `$type`.
        #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
        #[serde(tag = "$type")]
        pub enum ServerMessage {
            $(
                $(#[$meta])*
                #[serde(rename = $tag)]
                $variant($payload),
            )*
        }

        /// The discriminator of a [`ServerMessage`], without its payload.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ServerMessageType {
            $($variant,)*
        }

        impl ServerMessageType {
            /// Every recognized discriminator.
            pub const ALL: &'static [ServerMessageType] = &[$(ServerMessageType::$variant,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(ServerMessageType::$variant => $tag,)*
                }
            }

            /// Looks up a discriminator in the closed vocabulary.
            pub fn from_discriminator(tag: &str) -> Option<Self> {
                match tag {
                    $($tag => Some(ServerMessageType::$variant),)*
                    _ => None,
                }
            }
        }

        impl ServerMessage {
            pub fn kind(&self) -> ServerMessageType {
                match self {
                    $(ServerMessage::$variant(_) => ServerMessageType::$variant,)*
                }
            }
        }

        $(
            impl From<$payload> for ServerMessage {
                fn from(payload: $payload) -> Self {
                    ServerMessage::$variant(payload)
                }
            }
        )*
    };
}

server_messages! {
    /// Authentication succeeded.
    Welcome(Welcome) => "welcome",
    /// The service needs profile setup before it accepts this client.
    AuthenticationRequired(AuthenticationRequired) => "authenticationRequired",
    /// A protocol or authentication level failure, not tied to a chat.
    Error(ErrorMessage) => "error",
    ChatSessionError(ChatSessionError) => "chatSessionError",
    ModuleRuntimeInstances(ModuleRuntimeInstances) => "moduleRuntimeInstances",
    Configuration(Configuration) => "configuration",
    CharactersListLoaded(CharactersListLoaded) => "charactersListLoaded",
    ScenariosListLoaded(ScenariosListLoaded) => "scenariosListLoaded",
    ChatsListLoaded(ChatsListLoaded) => "chatsListLoaded",
    ChatsSessionsUpdated(ChatsSessionsUpdated) => "chatsSessionsUpdated",
    ChatStarting(ChatStarting) => "chatStarting",
    ChatLoadingMessage(ChatLoadingMessage) => "chatLoadingMessage",
    ChatConfiguration(ChatConfiguration) => "chatConfiguration",
    ChatStarted(ChatStarted) => "chatStarted",
    ChatPaused(ChatPaused) => "chatPaused",
    ChatClosed(ChatClosed) => "chatClosed",
    ChatUpdated(ChatUpdated) => "chatUpdated",
    RecordingStatus(RecordingStatus) => "recordingStatus",
    RecordingRequest(RecordingRequest) => "recordingRequest",
    MessageUpdated(MessageUpdated) => "update",
    ReplyGenerating(ReplyGenerating) => "replyGenerating",
    ReplyStart(ReplyStart) => "replyStart",
    ReplyThink(ReplyThink) => "replyThink",
    ReplyChunk(ReplyChunk) => "replyChunk",
    ReplyEnd(ReplyEnd) => "replyEnd",
    ReplyCancelled(ReplyCancelled) => "replyCancelled",
    SpeechRecognitionStart(SpeechRecognitionStart) => "speechRecognitionStart",
    SpeechRecognitionPartial(SpeechRecognitionPartial) => "speechRecognitionPartial",
    SpeechRecognitionEnd(SpeechRecognitionEnd) => "speechRecognitionEnd",
    SpeechPlaybackStarted(SpeechPlaybackStarted) => "speechPlaybackStart",
    SpeechPlaybackCompleted(SpeechPlaybackCompleted) => "speechPlaybackComplete",
    InterruptSpeech(InterruptSpeech) => "interruptSpeech",
    Action(Action) => "action",
    AppTrigger(AppTrigger) => "appTrigger",
    ContextUpdated(ContextUpdated) => "contextUpdated",
    MemoryUpdated(MemoryUpdated) => "memoryUpdated",
    AudioFrame(AudioFrame) => "audioFrame",
    ChatParticipantsUpdated(ChatParticipantsUpdated) => "chatParticipantsUpdated",
    ChatFlow(ChatFlow) => "chatFlow",
    ListResourcesResult(ListResourcesResult) => "listResourcesResult",
    DeployResourceResult(DeployResourceResult) => "deployResourceResult",
    MissingResourcesError(MissingResourcesError) => "missingResourcesError",
    VisionCaptureRequest(VisionCaptureRequest) => "visionCaptureRequest",
    WakeWordStatus(WakeWordStatus) => "wakeWordStatus",
    Suggestions(Suggestions) => "suggestions",
    DownloadProgress(DownloadProgress) => "downloadProgress",
    DocumentUpdated(DocumentUpdated) => "documentUpdated",
    UserInteractionRequest(UserInteractionRequest) => "userInteractionRequest",
    CloseUserInteractionRequest(CloseUserInteractionRequest) => "closeUserInteractionRequest",
}

impl fmt::Display for ServerMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ServerMessage {
    /// Turns a raw inbound frame into a protocol message.
    ///
    /// Returns `None` when the frame is not an object, has no string `$type`,
    /// carries a discriminator outside the vocabulary, or has a payload that
    /// does not fit the shape for its discriminator. Only the last case is
    /// logged. Enum values this build does not list decode as `Unknown` and
    /// `null` collections decode as empty, so neither counts as a bad shape.
    pub fn classify(frame: &Value) -> Option<ServerMessage> {
        let tag = frame.as_object()?.get(TYPE_FIELD)?.as_str()?;
        let kind = ServerMessageType::from_discriminator(tag)?;
        match ServerMessage::deserialize(frame) {
            Ok(message) => Some(message),
            Err(error) => {
                warn!(discriminator = %kind, %error, "Dropping malformed frame");
                None
            }
        }
    }

    /// The chat session this event belongs to, if it is session scoped.
    pub fn session_id(&self) -> Option<Guid> {
        match self {
            ServerMessage::ChatSessionError(m) => Some(m.session_id),
            ServerMessage::ChatStarting(m) => Some(m.session_id),
            ServerMessage::ChatLoadingMessage(m) => Some(m.session_id),
            ServerMessage::ChatConfiguration(m) => Some(m.session_id),
            ServerMessage::ChatStarted(m) => Some(m.session_id),
            ServerMessage::ChatPaused(m) => Some(m.session_id),
            ServerMessage::ChatClosed(m) => Some(m.session_id),
            ServerMessage::ChatUpdated(m) => Some(m.session_id),
            ServerMessage::RecordingStatus(m) => Some(m.session_id),
            ServerMessage::RecordingRequest(m) => Some(m.session_id),
            ServerMessage::MessageUpdated(m) => Some(m.session_id),
            ServerMessage::ReplyGenerating(m) => Some(m.session_id),
            ServerMessage::ReplyStart(m) => Some(m.session_id),
            ServerMessage::ReplyThink(m) => Some(m.session_id),
            ServerMessage::ReplyChunk(m) => Some(m.session_id),
            ServerMessage::ReplyEnd(m) => Some(m.session_id),
            ServerMessage::ReplyCancelled(m) => Some(m.session_id),
            ServerMessage::SpeechPlaybackStarted(m) => Some(m.session_id),
            ServerMessage::SpeechPlaybackCompleted(m) => Some(m.session_id),
            ServerMessage::Action(m) => Some(m.session_id),
            ServerMessage::AppTrigger(m) => Some(m.session_id),
            ServerMessage::ContextUpdated(m) => Some(m.session_id),
            ServerMessage::MemoryUpdated(m) => Some(m.session_id),
            ServerMessage::ChatParticipantsUpdated(m) => Some(m.session_id),
            ServerMessage::ChatFlow(m) => Some(m.session_id),
            ServerMessage::VisionCaptureRequest(m) => Some(m.session_id),
            ServerMessage::WakeWordStatus(m) => Some(m.session_id),
            ServerMessage::Suggestions(m) => m.session_id,
            ServerMessage::DocumentUpdated(m) => Some(m.session_id),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    #[serde(default)]
    pub voxta_server_version: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub registered_client_version: Option<String>,
    pub user: ChatParticipantInfo,
    #[serde(default)]
    pub favorite: Option<ChatParticipantInfo>,
    #[serde(default)]
    pub assistant: Option<ChatParticipantInfo>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AuthenticationRequired {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

/// A failure scoped to one chat session.
///
/// `retry: true` means the session survives and the caller may resend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionError {
    pub session_id: Guid,
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub retry: Option<bool>,
}

impl ChatSessionError {
    pub fn is_retryable(&self) -> bool {
        self.retry.unwrap_or(false)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ModuleRuntimeInstances {
    #[serde(default, deserialize_with = "null_as_default")]
    pub instances: Vec<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default, deserialize_with = "null_as_default")]
    pub configurations: Vec<Value>,
    #[serde(default)]
    pub services: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub feature_flags: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CharactersListLoaded {
    pub characters: Vec<CharactersListItem>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScenariosListLoaded {
    pub scenarios: Vec<ScenarioInfo>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatsListLoaded {
    pub chats: Vec<ChatsListItem>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatsSessionsUpdated {
    pub sessions: Vec<ChatSessionInfo>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatStarting {
    pub session_id: Guid,
    pub chat_id: Guid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub chat_style: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatLoadingMessage {
    pub session_id: Guid,
    pub text: String,
    #[serde(default)]
    pub progress: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfiguration {
    pub session_id: Guid,
    pub chat_id: Guid,
    #[serde(default)]
    pub services: Value,
    #[serde(default)]
    pub user: Option<ChatParticipantInfo>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub characters: Vec<ChatParticipantInfo>,
    #[serde(default)]
    pub narrator: Option<ChatParticipantInfo>,
    #[serde(default)]
    pub scenario: Option<ScenarioInfo>,
}

/// A chat session is live. Replies to both `startChat` and `resumeChat`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatStarted {
    pub session_id: Guid,
    pub chat_id: Guid,
    #[serde(default)]
    pub user: Option<ChatParticipantInfo>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub characters: Vec<ChatParticipantInfo>,
    #[serde(default)]
    pub narrator: Option<ChatParticipantInfo>,
    #[serde(default)]
    pub scenario: Option<ScenarioInfo>,
    #[serde(default)]
    pub services: Value,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub chat_style: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub context: Option<ContextUpdated>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatPaused {
    pub session_id: Guid,
    pub paused: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatClosed {
    pub session_id: Guid,
    pub chat_id: Guid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatUpdated {
    pub session_id: Guid,
    pub chat_id: Guid,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub session_id: Guid,
    pub enabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRequest {
    pub session_id: Guid,
    pub enabled: bool,
}

/// A stored message changed (sent with the `update` discriminator).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdated {
    pub session_id: Guid,
    pub message_id: Guid,
    pub sender_id: Guid,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tokens: Option<u32>,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub conversation_index: Option<u32>,
    #[serde(default)]
    pub chat_time: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: ChatMessageRole,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyGenerating {
    pub session_id: Guid,
    pub message_id: Guid,
    pub sender_id: Guid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: ChatMessageRole,
    #[serde(default)]
    pub thinking_speech_url: Option<String>,
    #[serde(default)]
    pub is_narration: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyStart {
    pub session_id: Guid,
    pub message_id: Guid,
    pub sender_id: Guid,
    #[serde(default)]
    pub chat_time: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyThink {
    pub session_id: Guid,
    pub message_id: Guid,
    pub sender_id: Guid,
    pub text: String,
}

/// One streamed fragment of a reply.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyChunk {
    pub session_id: Guid,
    pub message_id: Guid,
    #[serde(default)]
    pub sender_id: Option<Guid>,
    #[serde(default)]
    pub start_index: Option<u32>,
    #[serde(default)]
    pub end_index: Option<u32>,
    pub text: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub is_narration: Option<bool>,
    #[serde(default)]
    pub audio_gap_ms: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnd {
    pub session_id: Guid,
    pub message_id: Guid,
    #[serde(default)]
    pub sender_id: Option<Guid>,
    #[serde(default)]
    pub tokens: Option<u32>,
    #[serde(default)]
    pub message_index: Option<u32>,
    #[serde(default)]
    pub conversation_index: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyCancelled {
    pub session_id: Guid,
    pub message_id: Guid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SpeechRecognitionStart {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpeechRecognitionPartial {
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SpeechRecognitionEnd {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeechPlaybackStarted {
    pub session_id: Guid,
    pub message_id: Guid,
    #[serde(default)]
    pub start_index: Option<u32>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeechPlaybackCompleted {
    pub session_id: Guid,
    pub message_id: Guid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InterruptSpeech {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub session_id: Guid,
    #[serde(default)]
    pub context_key: Option<String>,
    #[serde(default)]
    pub layer: Option<String>,
    pub value: String,
    #[serde(default)]
    pub role: Option<ChatMessageRole>,
    pub sender_id: Guid,
    #[serde(default)]
    pub scenario_role: Option<String>,
    #[serde(default)]
    pub arguments: Option<Vec<ActionInvocationArgument>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppTrigger {
    pub session_id: Guid,
    #[serde(default)]
    pub message_id: Option<Guid>,
    #[serde(default)]
    pub trigger_id: Option<Guid>,
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Vec<Value>>,
    pub sender_id: Guid,
    #[serde(default)]
    pub scenario_role: Option<String>,
}

/// The chat's shared context after an update.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextUpdated {
    pub session_id: Guid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub flags: Vec<FlagInfo>,
    #[serde(default)]
    pub contexts: Option<Vec<Value>>,
    #[serde(default)]
    pub actions: Option<Vec<Value>>,
    #[serde(default)]
    pub buttons: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub characters: Vec<ChatParticipantInfo>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: HashMap<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUpdated {
    pub session_id: Guid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub memories: Vec<Value>,
    pub character_id: Guid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AudioFrame {
    #[serde(default)]
    pub rms: Option<f64>,
    #[serde(default)]
    pub voice_activity: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatParticipantsUpdated {
    pub session_id: Guid,
    pub characters: Vec<ChatParticipantInfo>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatFlow {
    pub session_id: Guid,
    pub state: ChatFlowState,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ListResourcesResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources: Vec<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeployResourceResult {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub id: Guid,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MissingResourcesError {
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources: Vec<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisionCaptureRequest {
    pub session_id: Guid,
    pub vision_capture_request_id: Guid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: ComputerVisionSource,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WakeWordStatus {
    pub session_id: Guid,
    pub enabled: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stand_by: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Suggestions {
    #[serde(default)]
    pub session_id: Option<Guid>,
    pub suggestions: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub id: Guid,
    pub target: String,
    pub status: String,
    pub percent: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdated {
    pub session_id: Guid,
    pub document_id: Guid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserInteractionRequest {
    pub request_id: Guid,
    #[serde(default)]
    pub module_id: Option<Guid>,
    pub message: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloseUserInteractionRequest {
    pub request_id: Guid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_classify_welcome() {
        let user = Uuid::new_v4();
        let frame = json!({
            "$type": "welcome",
            "voxtaServerVersion": "1.0.0",
            "user": { "id": user, "name": "Sam" },
        });
        match ServerMessage::classify(&frame) {
            Some(ServerMessage::Welcome(welcome)) => {
                assert_eq!(welcome.user.id, user);
                assert_eq!(welcome.voxta_server_version.as_deref(), Some("1.0.0"));
            }
            other => panic!("Expected welcome, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_drops_unknown_discriminator() {
        let frame = json!({ "$type": "someFutureEvent", "sessionId": Uuid::new_v4() });
        assert!(ServerMessage::classify(&frame).is_none());
    }

    #[test]
    fn test_classify_drops_missing_or_non_string_discriminator() {
        assert!(ServerMessage::classify(&json!({ "message": "no tag" })).is_none());
        assert!(ServerMessage::classify(&json!({ "$type": 42 })).is_none());
        assert!(ServerMessage::classify(&json!("welcome")).is_none());
        assert!(ServerMessage::classify(&json!(null)).is_none());
    }

    #[test]
    fn test_classify_drops_malformed_payload() {
        let frame = json!({ "$type": "replyChunk", "text": "missing ids" });
        assert!(ServerMessage::classify(&frame).is_none());
    }

    #[test]
    fn test_update_discriminator_maps_to_message_updated() {
        let frame = json!({
            "$type": "update",
            "sessionId": Uuid::new_v4(),
            "messageId": Uuid::new_v4(),
            "senderId": Uuid::new_v4(),
            "text": "edited",
            "role": "User",
        });
        let message = ServerMessage::classify(&frame).unwrap();
        assert_eq!(message.kind(), ServerMessageType::MessageUpdated);
        assert_eq!(message.kind().as_str(), "update");
    }

    #[test]
    fn test_reply_chunk_carries_audio_url() {
        let session = Uuid::new_v4();
        let frame = json!({
            "$type": "replyChunk",
            "sessionId": session,
            "messageId": Uuid::new_v4(),
            "senderId": Uuid::new_v4(),
            "startIndex": 0,
            "endIndex": 5,
            "text": "Hello",
            "audioUrl": "/api/tts/abc.wav",
        });
        let message = ServerMessage::classify(&frame).unwrap();
        assert_eq!(message.session_id(), Some(session));
        match message {
            ServerMessage::ReplyChunk(chunk) => {
                assert_eq!(chunk.text, "Hello");
                assert_eq!(chunk.audio_url.as_deref(), Some("/api/tts/abc.wav"));
            }
            other => panic!("Expected replyChunk, got {:?}", other),
        }
    }

    #[test]
    fn test_chat_started_with_nested_context() {
        let session = Uuid::new_v4();
        let chat = Uuid::new_v4();
        let frame = json!({
            "$type": "chatStarted",
            "sessionId": session,
            "chatId": chat,
            "user": { "id": Uuid::new_v4(), "name": "Sam" },
            "characters": [{ "id": Uuid::new_v4(), "name": "Aria" }],
            "services": {},
            "augmentations": [],
            "messages": [],
            "context": {
                "$type": "contextUpdated",
                "sessionId": session,
                "flags": [{ "name": "met" }],
                "characters": [],
                "roles": {},
            },
        });
        match ServerMessage::classify(&frame) {
            Some(ServerMessage::ChatStarted(started)) => {
                assert_eq!(started.chat_id, chat);
                assert_eq!(started.characters[0].name, "Aria");
                let context = started.context.unwrap();
                assert_eq!(context.flags[0].name, "met");
            }
            other => panic!("Expected chatStarted, got {:?}", other),
        }
    }

    #[test]
    fn test_unlisted_enum_values_do_not_drop_the_frame() {
        let (session, chat) = (Uuid::new_v4(), Uuid::new_v4());
        let frame = json!({
            "$type": "chatStarted",
            "sessionId": session,
            "chatId": chat,
            "messages": [{
                "messageId": Uuid::new_v4(),
                "role": "Narrator",
                "senderId": Uuid::new_v4(),
                "text": "The rain keeps falling.",
                "timestamp": "2024-01-01T00:00:00Z",
            }],
        });
        match ServerMessage::classify(&frame) {
            Some(ServerMessage::ChatStarted(started)) => {
                assert_eq!(started.chat_id, chat);
                assert_eq!(started.messages[0].role, ChatMessageRole::Unknown);
            }
            other => panic!("Expected chatStarted, got {:?}", other),
        }

        let frame = json!({ "$type": "chatFlow", "sessionId": session, "state": "Daydreaming" });
        match ServerMessage::classify(&frame) {
            Some(ServerMessage::ChatFlow(flow)) => assert_eq!(flow.state, ChatFlowState::Unknown),
            other => panic!("Expected chatFlow, got {:?}", other),
        }
    }

    #[test]
    fn test_null_collections_read_as_empty() {
        let session = Uuid::new_v4();
        let frame = json!({
            "$type": "contextUpdated",
            "sessionId": session,
            "flags": null,
            "characters": null,
            "roles": null,
        });
        match ServerMessage::classify(&frame) {
            Some(ServerMessage::ContextUpdated(context)) => {
                assert_eq!(context.session_id, session);
                assert!(context.flags.is_empty());
                assert!(context.characters.is_empty());
                assert!(context.roles.is_empty());
            }
            other => panic!("Expected contextUpdated, got {:?}", other),
        }

        let frame = json!({
            "$type": "chatStarted",
            "sessionId": session,
            "chatId": Uuid::new_v4(),
            "characters": null,
            "messages": null,
        });
        assert!(matches!(
            ServerMessage::classify(&frame),
            Some(ServerMessage::ChatStarted(started)) if started.characters.is_empty() && started.messages.is_empty()
        ));
    }

    #[test]
    fn test_session_error_retry_flag() {
        let frame = json!({
            "$type": "chatSessionError",
            "sessionId": Uuid::new_v4(),
            "message": "TextGen failed",
        });
        match ServerMessage::classify(&frame) {
            Some(ServerMessage::ChatSessionError(error)) => assert!(!error.is_retryable()),
            other => panic!("Expected chatSessionError, got {:?}", other),
        }
    }

    #[test]
    fn test_discriminator_lookup_covers_every_type() {
        for kind in ServerMessageType::ALL {
            assert_eq!(ServerMessageType::from_discriminator(kind.as_str()), Some(*kind));
        }
        assert_eq!(ServerMessageType::from_discriminator("Welcome"), None);
    }

    #[test]
    fn test_serialized_message_classifies_back_to_same_kind() {
        let message = ServerMessage::from(ReplyCancelled {
            session_id: Uuid::new_v4(),
            message_id: Uuid::new_v4(),
        });
        let frame = serde_json::to_value(&message).unwrap();
        assert_eq!(frame[TYPE_FIELD], "replyCancelled");
        assert_eq!(ServerMessage::classify(&frame), Some(message));
    }
}
