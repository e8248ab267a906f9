//! JSON frame codec for the hub's real-time messaging service.
//!
//! Every message on the wire -- in either direction -- is one [`Frame`]: a
//! tagged JSON object with a `kind`, a target `topic`, and the optional
//! fields that kind uses. Commands carry a correlation id that the hub
//! echoes back in the matching `command_ack`; update events carry none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Correlation id linking an outbound command to its acknowledgment.
///
/// Allocated by the session's correlation table; unique for the lifetime
/// of a session.
pub type CorrelationId = u64;

// ── TopicId ─────────────────────────────────────────────────────────

/// The identifier the hub uses to address a specific device's message
/// stream (e.g. `"devices:412"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(String);

impl TopicId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The conventional topic for a directory device id.
    pub fn for_device(device_id: u64) -> Self {
        Self(format!("devices:{device_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TopicId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for TopicId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── AttributeValue ──────────────────────────────────────────────────

/// A loosely-typed attribute value.
///
/// Device attributes are boolean, numeric, or enumerated-string per
/// attribute name; the wire format carries whichever JSON type the hub
/// chose, so this is serde-untagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    /// Coerce a string-typed attribute state into a value.
    ///
    /// The hub's REST directory reports every attribute state as a string
    /// ("true", "68.0", "locked"); this applies the same loose coercion
    /// the hub's own web client uses.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => match raw.parse::<f64>() {
                Ok(n) => Self::Number(n),
                Err(_) => Self::Text(raw.to_owned()),
            },
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        Self::Number(n as f64)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

// ── Frame ───────────────────────────────────────────────────────────

/// Frame kind tag.
///
/// `Command`, `Subscribe`, and `Unsubscribe` are outbound; `CommandAck`,
/// `SubscribeAck`, and `UpdateEvent` are inbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Command,
    CommandAck,
    Subscribe,
    SubscribeAck,
    Unsubscribe,
    UpdateEvent,
}

/// Outcome reported in a `command_ack` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Ok,
    Error,
}

/// One message on the wire, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
    pub topic: TopicId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AttributeValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AckStatus>,
}

impl Frame {
    /// An attribute-change command awaiting acknowledgment.
    pub fn command(
        topic: TopicId,
        correlation_id: CorrelationId,
        attribute: impl Into<String>,
        value: AttributeValue,
    ) -> Self {
        Self {
            kind: FrameKind::Command,
            topic,
            correlation_id: Some(correlation_id),
            attribute: Some(attribute.into()),
            value: Some(value),
            status: None,
        }
    }

    /// The hub's acknowledgment of a command, echoing the correlation id
    /// and the confirmed value.
    pub fn command_ack(
        topic: TopicId,
        correlation_id: CorrelationId,
        attribute: impl Into<String>,
        value: AttributeValue,
        status: AckStatus,
    ) -> Self {
        Self {
            kind: FrameKind::CommandAck,
            topic,
            correlation_id: Some(correlation_id),
            attribute: Some(attribute.into()),
            value: Some(value),
            status: Some(status),
        }
    }

    pub fn subscribe(topic: TopicId) -> Self {
        Self::bare(FrameKind::Subscribe, topic)
    }

    pub fn subscribe_ack(topic: TopicId) -> Self {
        Self::bare(FrameKind::SubscribeAck, topic)
    }

    pub fn unsubscribe(topic: TopicId) -> Self {
        Self::bare(FrameKind::Unsubscribe, topic)
    }

    /// An unsolicited push reporting a changed attribute value.
    pub fn update_event(
        topic: TopicId,
        attribute: impl Into<String>,
        value: AttributeValue,
    ) -> Self {
        Self {
            kind: FrameKind::UpdateEvent,
            topic,
            correlation_id: None,
            attribute: Some(attribute.into()),
            value: Some(value),
            status: None,
        }
    }

    fn bare(kind: FrameKind, topic: TopicId) -> Self {
        Self {
            kind,
            topic,
            correlation_id: None,
            attribute: None,
            value: None,
            status: None,
        }
    }

    /// Serialize to a wire text frame.
    pub fn encode(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Decode {
            message: e.to_string(),
        })
    }

    /// Parse a wire text frame.
    pub fn decode(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Decode {
            message: e.to_string(),
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trip() {
        let frame = Frame::command("devices:7".into(), 42, "locked", true.into());
        let text = frame.encode().unwrap();

        let parsed = Frame::decode(&text).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.kind, FrameKind::Command);
        assert_eq!(parsed.correlation_id, Some(42));
    }

    #[test]
    fn decode_command_ack() {
        let text = r#"{
            "kind": "command_ack",
            "topic": "devices:7",
            "correlation_id": 42,
            "attribute": "locked",
            "value": true,
            "status": "ok"
        }"#;

        let frame = Frame::decode(text).unwrap();
        assert_eq!(frame.kind, FrameKind::CommandAck);
        assert_eq!(frame.status, Some(AckStatus::Ok));
        assert_eq!(frame.value, Some(AttributeValue::Bool(true)));
    }

    #[test]
    fn decode_update_event_with_number() {
        let text = r#"{"kind":"update_event","topic":"devices:3","attribute":"current_temp","value":71.5}"#;

        let frame = Frame::decode(text).unwrap();
        assert_eq!(frame.kind, FrameKind::UpdateEvent);
        assert_eq!(frame.correlation_id, None);
        assert_eq!(frame.value.unwrap().as_f64(), Some(71.5));
    }

    #[test]
    fn subscribe_omits_optional_fields() {
        let text = Frame::subscribe("devices:9".into()).encode().unwrap();
        assert!(!text.contains("correlation_id"), "got: {text}");
        assert!(!text.contains("attribute"), "got: {text}");
        assert!(!text.contains("status"), "got: {text}");
    }

    #[test]
    fn decode_rejects_malformed_frame() {
        assert!(matches!(
            Frame::decode("not json at all"),
            Err(Error::Decode { .. })
        ));
        // Valid JSON, unknown kind tag
        assert!(matches!(
            Frame::decode(r#"{"kind":"phx_join","topic":"devices:1"}"#),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn loose_value_coercion() {
        assert_eq!(AttributeValue::parse("true"), AttributeValue::Bool(true));
        assert_eq!(AttributeValue::parse("false"), AttributeValue::Bool(false));
        assert_eq!(AttributeValue::parse("68.0"), AttributeValue::Number(68.0));
        assert_eq!(
            AttributeValue::parse("heat"),
            AttributeValue::Text("heat".into())
        );
    }

    #[test]
    fn topic_for_device() {
        assert_eq!(TopicId::for_device(412).as_str(), "devices:412");
    }
}
