//! Commands sent from the client to the service.

use crate::shared::{
    ActionInvocationArgument, ChatMessageRole, ClientCapabilities, ComputerVisionSource,
    ContextDefinition, GenerateConstraintRequest, Guid,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Every command understood by the service, tagged with `$type`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "$type", rename_all = "camelCase")]
pub enum ClientMessage {
    Authenticate(Authenticate),
    LoadCharactersList(LoadCharactersList),
    LoadScenariosList(LoadScenariosList),
    LoadChatsList(LoadChatsList),
    StartChat(StartChat),
    ResumeChat(ResumeChat),
    PauseChat(PauseChat),
    StopChat(StopChat),
    DeleteChat(DeleteChat),
    SubscribeToChat(SubscribeToChat),
    UnsubscribeFromChat(UnsubscribeFromChat),
    UpdateContext(UpdateContext),
    Send(SendMessage),
    Update(UpdateMessage),
    DeleteMessage(DeleteMessage),
    Revert(Revert),
    Retry(Retry),
    Interrupt(Interrupt),
    Speak(Speak),
    TriggerAction(TriggerAction),
    CharacterSpeechRequest(CharacterSpeechRequest),
    SpeechPlaybackStart(SpeechPlaybackStart),
    SpeechPlaybackComplete(SpeechPlaybackComplete),
    TypingStart(TypingStart),
    TypingEnd(TypingEnd),
    AddChatParticipant(AddChatParticipant),
    RemoveChatParticipant(RemoveChatParticipant),
    RequestSuggestions(RequestSuggestions),
}

macro_rules! client_message_from {
    ($($variant:ident($payload:ident) => $tag:literal),* $(,)?) => {
        impl ClientMessage {
            /// The `$type` discriminator this command is sent with.
            pub fn kind(&self) -> &'static str {
                match self {
                    $(ClientMessage::$variant(_) => $tag,)*
                }
            }
        }

        $(
            impl From<$payload> for ClientMessage {
                fn from(payload: $payload) -> Self {
                    ClientMessage::$variant(payload)
                }
            }
        )*
    };
}

client_message_from! {
    Authenticate(Authenticate) => "authenticate",
    LoadCharactersList(LoadCharactersList) => "loadCharactersList",
    LoadScenariosList(LoadScenariosList) => "loadScenariosList",
    LoadChatsList(LoadChatsList) => "loadChatsList",
    StartChat(StartChat) => "startChat",
    ResumeChat(ResumeChat) => "resumeChat",
    PauseChat(PauseChat) => "pauseChat",
    StopChat(StopChat) => "stopChat",
    DeleteChat(DeleteChat) => "deleteChat",
    SubscribeToChat(SubscribeToChat) => "subscribeToChat",
    UnsubscribeFromChat(UnsubscribeFromChat) => "unsubscribeFromChat",
    UpdateContext(UpdateContext) => "updateContext",
    Send(SendMessage) => "send",
    Update(UpdateMessage) => "update",
    DeleteMessage(DeleteMessage) => "deleteMessage",
    Revert(Revert) => "revert",
    Retry(Retry) => "retry",
    Interrupt(Interrupt) => "interrupt",
    Speak(Speak) => "speak",
    TriggerAction(TriggerAction) => "triggerAction",
    CharacterSpeechRequest(CharacterSpeechRequest) => "characterSpeechRequest",
    SpeechPlaybackStart(SpeechPlaybackStart) => "speechPlaybackStart",
    SpeechPlaybackComplete(SpeechPlaybackComplete) => "speechPlaybackComplete",
    TypingStart(TypingStart) => "typingStart",
    TypingEnd(TypingEnd) => "typingEnd",
    AddChatParticipant(AddChatParticipant) => "addChatParticipant",
    RemoveChatParticipant(RemoveChatParticipant) => "removeChatParticipant",
    RequestSuggestions(RequestSuggestions) => "requestSuggestions",
}

/// Opens the authenticated part of the conversation. Must be the first command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Authenticate {
    /// Name the client registers under.
    pub client: String,
    pub client_version: Option<String>,
    pub scope: Vec<String>,
    pub capabilities: ClientCapabilities,
}

impl Authenticate {
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            client_version: None,
            scope: vec!["role:app".to_string()],
            capabilities: ClientCapabilities::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LoadCharactersList {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LoadScenariosList {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadChatsList {
    pub character_id: Guid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<Guid>,
}

/// Context fields shared by `startChat`, `resumeChat` and `updateContext`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContextPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<ContextDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_flags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_roles: Option<HashMap<String, bool>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartChat {
    /// Pins the chat to start; absent means the service creates a new one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<Guid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<Guid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_ids: Option<Vec<Guid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<Guid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<HashMap<String, Guid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_chat_memory: Option<bool>,
    #[serde(flatten)]
    pub context: ContextPayload,
}

impl StartChat {
    pub fn with_character(character_id: Guid) -> Self {
        Self {
            character_id: Some(character_id),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResumeChat {
    pub chat_id: Guid,
    #[serde(flatten)]
    pub context: ContextPayload,
}

impl ResumeChat {
    pub fn new(chat_id: Guid) -> Self {
        Self {
            chat_id,
            context: ContextPayload::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PauseChat {
    pub session_id: Guid,
    pub pause: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StopChat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Guid>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteChat {
    pub chat_id: Guid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeToChat {
    pub session_id: Guid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeFromChat {
    pub session_id: Guid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContext {
    pub session_id: Guid,
    #[serde(flatten)]
    pub context: ContextPayload,
}

/// An attachment on a `send` command. Inline content travels as a base64 data URL.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SendAttachment {
    #[serde(rename = "$type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ComputerVisionSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_url: Option<String>,
}

impl SendAttachment {
    pub fn base64_url(data_url: impl Into<String>) -> Self {
        Self {
            kind: Some("base64Url".to_string()),
            base64_url: Some(data_url.into()),
            ..Default::default()
        }
    }
}

/// A user turn sent into a running chat session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub session_id: Guid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<SendAttachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_response_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_continue: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_user_action_inference: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_reply: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_character_action_inference: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ChatMessageRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<Guid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_constraint_request: Option<GenerateConstraintRequest>,
}

impl SendMessage {
    /// A plain text turn that asks the characters to reply.
    pub fn text(session_id: Guid, text: impl Into<String>) -> Self {
        Self {
            session_id,
            text: Some(text.into()),
            attachments: None,
            character_response_prefix: None,
            do_continue: None,
            do_user_action_inference: None,
            do_reply: Some(true),
            do_character_action_inference: Some(true),
            role: None,
            character_id: None,
            trigger_event: None,
            generate_constraint_request: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    pub session_id: Guid,
    pub message_id: Guid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessage {
    pub session_id: Guid,
    pub message_id: Guid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Revert {
    pub session_id: Guid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Guid>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Retry {
    pub session_id: Guid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Interrupt {
    pub session_id: Guid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Speak {
    pub session_id: Guid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Guid>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAction {
    pub session_id: Guid,
    pub message_id: Guid,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<ActionInvocationArgument>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSpeechRequest {
    pub session_id: Guid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<Guid>,
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeechPlaybackStart {
    pub session_id: Guid,
    pub message_id: Guid,
    pub start_index: u32,
    pub end_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_narration: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeechPlaybackComplete {
    pub session_id: Guid,
    pub message_id: Guid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingStart {
    pub session_id: Guid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingEnd {
    pub session_id: Guid,
    pub sent: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddChatParticipant {
    pub session_id: Guid,
    pub character_id: Guid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoveChatParticipant {
    pub session_id: Guid,
    pub character_id: Guid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestSuggestions {
    pub session_id: Guid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}
