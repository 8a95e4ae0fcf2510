//! Payload types shared between client commands and server events.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Identifier type used for chats, sessions, messages and characters.
pub type Guid = Uuid;

/// Reads an explicit `null` the same way as a missing key.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioInputCapability {
    #[default]
    None,
    WebSocketStream,
    Disabled,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioOutputCapability {
    None,
    #[default]
    Url,
    LocalFile,
    Disabled,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisionCaptureCapability {
    #[default]
    None,
    PostImage,
    Disabled,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputerVisionSource {
    #[default]
    Undefined,
    Attachment,
    Eyes,
    Screen,
    Generated,
    #[serde(other)]
    Unknown,
}

/// What the client can do with audio and vision, announced in `authenticate`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    pub audio_input: AudioInputCapability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_output: Option<AudioOutputCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_audio_content_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_capture: Option<VisionCaptureCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_sources: Option<Vec<ComputerVisionSource>>,
}

impl Default for ClientCapabilities {
    /// Text chat with audio replies delivered as URLs.
    fn default() -> Self {
        Self {
            audio_input: AudioInputCapability::None,
            audio_output: Some(AudioOutputCapability::Url),
            audio_folder: None,
            accepted_audio_content_types: Some(vec![
                "audio/x-wav".to_string(),
                "audio/mpeg".to_string(),
            ]),
            vision_capture: Some(VisionCaptureCapability::None),
            vision_sources: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatMessageRole {
    #[default]
    Undefined,
    System,
    Assistant,
    User,
    Summary,
    Event,
    Instructions,
    Note,
    Secret,
    /// A role added by a newer service.
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatFlowState {
    #[default]
    Undefined,
    WaitingForUserInput,
    ProcessingAssistantReply,
    ProcessingUserMessage,
    SelectingSpeaker,
    #[serde(other)]
    Unknown,
}

/// A user or character taking part in a chat.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatParticipantInfo {
    pub id: Guid,
    pub name: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub scenario_role: Option<String>,
    #[serde(default)]
    pub app_configuration: Option<HashMap<String, String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionInfo {
    pub session_id: Guid,
    pub chat_id: Guid,
    pub user: ChatParticipantInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub characters: Vec<ChatParticipantInfo>,
}

/// A message already stored in a chat's history.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message_id: Guid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: ChatMessageRole,
    pub sender_id: Guid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub tokens: Option<u32>,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub conversation_index: Option<u32>,
    #[serde(default)]
    pub chat_time: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CharactersListItem {
    pub id: Guid,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub culture: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub explicit_content: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub favorite: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hidden: bool,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioInfoRole {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_character_id: Option<Guid>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioInfo {
    pub id: Guid,
    pub name: String,
    #[serde(default)]
    pub chat_flow: Option<String>,
    #[serde(default)]
    pub chat_style: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: Vec<ScenarioInfoRole>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub client: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatsListItem {
    pub id: Guid,
    pub created: String,
}

/// A scenario flag currently set on a chat.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlagInfo {
    pub name: String,
    #[serde(default)]
    pub message_chat_time: Option<f64>,
    #[serde(default)]
    pub message_index: Option<i64>,
    #[serde(default)]
    pub expire_chat_time: Option<f64>,
    #[serde(default)]
    pub expire_index: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContextDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Guid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_filter: Option<String>,
}

impl ContextDefinition {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActionInvocationArgument {
    pub name: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateConstraintRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sentences: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_multiple_lines: Option<bool>,
}

/// First frame sent on the audio input side channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioInputSpecifications {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_milliseconds: Option<u32>,
}

impl Default for AudioInputSpecifications {
    fn default() -> Self {
        Self {
            content_type: Some("audio/wav".to_string()),
            sample_rate: 16_000,
            channels: 1,
            bits_per_sample: 16,
            buffer_milliseconds: Some(30),
        }
    }
}
