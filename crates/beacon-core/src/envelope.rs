//! Wire envelope.
//!
//! Every frame on the socket is a JSON object:
//!
//! ```text
//! { "type": "<kind>", "data": { ... }, "timestamp": "<ISO-8601>" }
//! ```
//!
//! Known kinds decode into typed payloads. Unknown kinds, and known kinds whose
//! payload does not fit the typed shape, are carried through as
//! [`Message::Unknown`] so that subscribers decide whether to act on them.

use crate::ProtocolError;
use crate::payload::{ChatMessage, DirectMessage, Notification, VideoAction, VideoSignal};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire names of the known kinds.
pub mod kind {
    pub const NOTIFICATION: &str = "NOTIFICATION";
    pub const CHAT: &str = "CHAT";
    pub const VIDEO: &str = "VIDEO";
    pub const MESSAGE: &str = "MESSAGE";
}

/// Typed envelope contents, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Notification(Notification),
    Chat(ChatMessage),
    Video(VideoSignal),
    Direct(DirectMessage),
    /// A kind this client does not know, or a known kind whose payload did
    /// not decode. The raw payload is kept as received.
    Unknown { kind: String, data: Value },
}

impl Message {
    /// The `type` discriminator used on the wire.
    pub fn kind(&self) -> &str {
        match self {
            Self::Notification(_) => kind::NOTIFICATION,
            Self::Chat(_) => kind::CHAT,
            Self::Video(_) => kind::VIDEO,
            Self::Direct(_) => kind::MESSAGE,
            Self::Unknown { kind, .. } => kind,
        }
    }

    fn from_parts(kind: String, data: Value) -> Self {
        // Known kinds with no payload decode as an empty object.
        let object = match &data {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        let typed = match kind.as_str() {
            kind::NOTIFICATION => serde_json::from_value(object).map(Self::Notification),
            kind::CHAT => serde_json::from_value(object).map(Self::Chat),
            kind::VIDEO => serde_json::from_value(object).map(Self::Video),
            kind::MESSAGE => serde_json::from_value(object).map(Self::Direct),
            _ => return Self::Unknown { kind, data },
        };
        typed.unwrap_or_else(|e| {
            tracing::debug!(
                kind = %kind,
                error = %e,
                "payload does not match its kind; keeping raw data"
            );
            Self::Unknown { kind, data }
        })
    }

    fn data(&self) -> Result<Value, ProtocolError> {
        let data = match self {
            Self::Notification(n) => serde_json::to_value(n)?,
            Self::Chat(c) => serde_json::to_value(c)?,
            Self::Video(v) => serde_json::to_value(v)?,
            Self::Direct(d) => serde_json::to_value(d)?,
            Self::Unknown { data, .. } => data.clone(),
        };
        Ok(data)
    }
}

/// A message stamped with the time it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub message: Message,
    pub sent_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

impl Envelope {
    /// Stamp `message` with the current time.
    pub fn new(message: Message) -> Self {
        Self {
            message,
            sent_at: Utc::now(),
        }
    }

    pub fn notification(notification: Notification) -> Self {
        Self::new(Message::Notification(notification))
    }

    pub fn chat(room_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Message::Chat(ChatMessage::new(room_id, content)))
    }

    pub fn direct(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Message::Direct(DirectMessage::new(conversation_id, content)))
    }

    pub fn video(room_id: impl Into<String>, action: VideoAction) -> Self {
        Self::new(Message::Video(VideoSignal::new(room_id, action)))
    }

    pub fn kind(&self) -> &str {
        self.message.kind()
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let wire = WireEnvelope {
            kind: self.message.kind().to_string(),
            data: self.message.data()?,
            timestamp: Some(self.sent_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Decode a JSON text frame.
    ///
    /// Only a frame that is not a JSON object with a string `type` is an
    /// error. A missing or unreadable `timestamp` becomes the arrival time.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let wire: WireEnvelope = serde_json::from_str(text)?;
        let sent_at = match wire.timestamp.as_deref() {
            Some(value) => parse_timestamp(value).unwrap_or_else(|| {
                tracing::debug!(value, "unreadable envelope timestamp; using arrival time");
                Utc::now()
            }),
            None => Utc::now(),
        };
        Ok(Self {
            message: Message::from_parts(wire.kind, wire.data),
            sent_at,
        })
    }
}

/// RFC 3339, or an ISO-8601 local date-time without offset read as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    value
        .parse::<NaiveDateTime>()
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::MediaStatus;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn chat_wire_shape() {
        let mut envelope = Envelope::chat("course-7", "hi all");
        envelope.sent_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let wire: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(
            wire,
            json!({
                "type": "CHAT",
                "data": { "roomId": "course-7", "content": "hi all" },
                "timestamp": "2024-03-01T12:00:00.000Z"
            })
        );
    }

    #[test]
    fn decodes_video_status() {
        let envelope = Envelope::from_json(
            r#"{"type":"VIDEO","data":{"roomId":"r","action":"status","videoEnabled":true},"timestamp":"2024-03-01T12:00:00.000Z"}"#,
        )
        .unwrap();
        match envelope.message {
            Message::Video(signal) => {
                assert_eq!(signal.room_id, "r");
                assert_eq!(
                    signal.action,
                    VideoAction::Status(MediaStatus {
                        video_enabled: true,
                        ..MediaStatus::default()
                    })
                );
            }
            other => panic!("expected video, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_not_rejected() {
        let envelope =
            Envelope::from_json(r#"{"type":"GRADE_POSTED","data":{"courseId":9}}"#).unwrap();
        assert_eq!(envelope.kind(), "GRADE_POSTED");
        assert_eq!(
            envelope.message,
            Message::Unknown {
                kind: "GRADE_POSTED".into(),
                data: json!({"courseId": 9})
            }
        );
    }

    #[test]
    fn unknown_kind_reencodes_unchanged() {
        let text = r#"{"type":"PRESENCE","data":[1,"two"],"timestamp":"2024-03-01T12:00:00.000Z"}"#;
        let envelope = Envelope::from_json(text).unwrap();
        let back: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        let orig: Value = serde_json::from_str(text).unwrap();
        assert_eq!(back, orig);
    }

    #[test]
    fn notification_without_data() {
        let envelope = Envelope::from_json(r#"{"type":"NOTIFICATION"}"#).unwrap();
        assert_eq!(envelope.message, Message::Notification(Notification::default()));
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(
            Envelope::from_json("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            Envelope::from_json(r#"{"data":{}}"#),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            Envelope::from_json(r#"{"type":7,"data":{}}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn chat_with_partial_payload_is_delivered() {
        let envelope = Envelope::from_json(
            r#"{"type":"CHAT","data":{"content":"hi","senderId":"u1","courseId":"c9"},"timestamp":"2024-03-01T12:00:00Z"}"#,
        )
        .unwrap();
        match envelope.message {
            Message::Chat(chat) => {
                assert_eq!(chat.room_id, "");
                assert_eq!(chat.content, "hi");
                assert_eq!(chat.sender_id.as_deref(), Some("u1"));
                assert_eq!(chat.extra["courseId"], json!("c9"));
            }
            other => panic!("expected chat, got {other:?}"),
        }
    }

    #[test]
    fn mistyped_payload_keeps_raw_data() {
        let envelope =
            Envelope::from_json(r#"{"type":"CHAT","data":{"roomId":"r","content":42}}"#).unwrap();
        assert_eq!(envelope.kind(), "CHAT");
        assert_eq!(
            envelope.message,
            Message::Unknown {
                kind: "CHAT".into(),
                data: json!({"roomId": "r", "content": 42})
            }
        );

        let envelope = Envelope::from_json(r#"{"type":"VIDEO","data":{"roomId":"r"}}"#).unwrap();
        assert!(matches!(envelope.message, Message::Unknown { ref kind, .. } if kind == "VIDEO"));
    }

    #[test]
    fn timestamp_offset_is_normalized_to_utc() {
        let envelope = Envelope::from_json(
            r#"{"type":"MESSAGE","data":{"conversationId":"c","content":"x"},"timestamp":"2024-03-01T14:00:00+02:00"}"#,
        )
        .unwrap();
        assert_eq!(
            envelope.sent_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn timestamp_without_offset_is_read_as_utc() {
        let envelope = Envelope::from_json(
            r#"{"type":"NOTIFICATION","data":{"title":"t"},"timestamp":"2024-03-01T12:00:00"}"#,
        )
        .unwrap();
        assert_eq!(
            envelope.sent_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );

        let envelope = Envelope::from_json(
            r#"{"type":"NOTIFICATION","timestamp":"2024-03-01T12:00:00.250"}"#,
        )
        .unwrap();
        assert_eq!(envelope.sent_at.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn unreadable_timestamp_falls_back_to_arrival_time() {
        let before = Utc::now();
        let envelope = Envelope::from_json(
            r#"{"type":"CHAT","data":{"roomId":"r","content":"x"},"timestamp":"yesterday"}"#,
        )
        .unwrap();
        assert!(envelope.sent_at >= before);
        assert!(matches!(envelope.message, Message::Chat(_)));
    }
}
