//! Per-kind payload shapes.
//!
//! Field names are camelCase on the wire. Every payload keeps fields it does
//! not recognise in `extra`, so a newer server can add fields without older
//! clients losing them on re-serialisation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `NOTIFICATION` payload: a toast-style alert for the current user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `CHAT` payload: a message posted to a course or group chat room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(room_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            content: content.into(),
            sender_id: None,
            extra: Map::new(),
        }
    }
}

/// `MESSAGE` payload: a one-to-one direct message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DirectMessage {
    pub fn new(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            content: content.into(),
            sender_id: None,
            extra: Map::new(),
        }
    }
}

/// `VIDEO` payload: call signalling, discriminated by `data.action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct VideoSignal {
    pub room_id: String,
    pub action: VideoAction,
    pub extra: Map<String, Value>,
}

impl VideoSignal {
    pub fn new(room_id: impl Into<String>, action: VideoAction) -> Self {
        Self {
            room_id: room_id.into(),
            action,
            extra: Map::new(),
        }
    }
}

/// What a participant did in a video call.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoAction {
    Join,
    Leave,
    /// In-call chat line.
    Chat { message: String },
    /// Emoji reaction.
    Reaction { reaction: String },
    /// Media toggles changed.
    Status(MediaStatus),
    /// An action this client does not know. Its fields stay in `extra`.
    Other(String),
}

impl VideoAction {
    /// The `data.action` discriminator.
    pub fn name(&self) -> &str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Chat { .. } => "chat",
            Self::Reaction { .. } => "reaction",
            Self::Status(_) => "status",
            Self::Other(name) => name,
        }
    }
}

/// Microphone, camera, and screen-share flags of a participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaStatus {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub screen_sharing: bool,
}

/// Error decoding a `VIDEO` payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VideoSignalError {
    #[error("video payload is missing string field `{0}`")]
    MissingField(&'static str),
}

fn take_string(map: &mut Map<String, Value>, key: &'static str) -> Result<String, VideoSignalError> {
    match map.remove(key) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(VideoSignalError::MissingField(key)),
    }
}

fn take_flag(map: &mut Map<String, Value>, key: &str) -> bool {
    map.remove(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

impl TryFrom<Map<String, Value>> for VideoSignal {
    type Error = VideoSignalError;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        let room_id = take_string(&mut map, "roomId")?;
        let action = take_string(&mut map, "action")?;
        let action = match action.as_str() {
            "join" => VideoAction::Join,
            "leave" => VideoAction::Leave,
            "chat" => VideoAction::Chat {
                message: take_string(&mut map, "message")?,
            },
            "reaction" => VideoAction::Reaction {
                reaction: take_string(&mut map, "reaction")?,
            },
            "status" => VideoAction::Status(MediaStatus {
                audio_enabled: take_flag(&mut map, "audioEnabled"),
                video_enabled: take_flag(&mut map, "videoEnabled"),
                screen_sharing: take_flag(&mut map, "screenSharing"),
            }),
            _ => VideoAction::Other(action),
        };
        Ok(Self {
            room_id,
            action,
            extra: map,
        })
    }
}

impl From<VideoSignal> for Map<String, Value> {
    fn from(signal: VideoSignal) -> Self {
        let mut map = signal.extra;
        map.insert("roomId".into(), Value::String(signal.room_id));
        map.insert("action".into(), Value::String(signal.action.name().to_string()));
        match signal.action {
            VideoAction::Chat { message } => {
                map.insert("message".into(), Value::String(message));
            }
            VideoAction::Reaction { reaction } => {
                map.insert("reaction".into(), Value::String(reaction));
            }
            VideoAction::Status(status) => {
                map.insert("audioEnabled".into(), Value::Bool(status.audio_enabled));
                map.insert("videoEnabled".into(), Value::Bool(status.video_enabled));
                map.insert("screenSharing".into(), Value::Bool(status.screen_sharing));
            }
            VideoAction::Join | VideoAction::Leave | VideoAction::Other(_) => {}
        }
        map
    }
}
