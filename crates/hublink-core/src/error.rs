// ── Engine error taxonomy ──
//
// Every fallible engine operation returns one of these. The variants
// distinguish the three ways a command can fail to complete (timeout,
// connection loss, session closed) because callers react differently to
// each: retry the command, reconnect, or rebuild the session.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The transport handed to `Session::connect` was already unusable.
    #[error("transport unusable: {reason}")]
    ConnectionError { reason: String },

    /// The connection dropped while the operation was in flight. The
    /// command's fate is unknown: the hub may or may not have applied it.
    #[error("connection to the hub was lost")]
    ConnectionLost,

    /// No acknowledgment arrived within the caller's deadline. Late acks
    /// for this command are silently discarded.
    #[error("no acknowledgment within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The session was ended (or dropped) before the operation started.
    #[error("session is closed")]
    SessionClosed,

    /// The hub acknowledged the command with an error status.
    #[error("hub rejected the command: {message}")]
    CommandFailed { message: String },

    /// The attribute is not writable for this device kind.
    #[error("attribute `{attribute}` is not writable on a {kind} device")]
    InvalidAttribute { kind: String, attribute: String },

    /// The value is outside the attribute's accepted set.
    #[error("value `{value}` is not accepted for attribute `{attribute}`")]
    InvalidValue { attribute: String, value: String },

    /// A frame could not be encoded.
    #[error("frame codec error: {message}")]
    Codec { message: String },
}

impl From<hublink_api::Error> for EngineError {
    fn from(err: hublink_api::Error) -> Self {
        match err {
            hublink_api::Error::Decode { message } => Self::Codec { message },
            other => Self::ConnectionError {
                reason: other.to_string(),
            },
        }
    }
}

impl EngineError {
    /// Whether reconnecting with the same credentials could help.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError { .. }
                | Self::ConnectionLost
                | Self::Timeout { .. }
                | Self::SessionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_translate_from_api() {
        let api = hublink_api::Error::Decode {
            message: "bad frame".into(),
        };
        let engine = EngineError::from(api);
        assert!(matches!(engine, EngineError::Codec { .. }));
    }

    #[test]
    fn validation_errors_are_not_recoverable() {
        let err = EngineError::InvalidAttribute {
            kind: "lock".into(),
            attribute: "level".into(),
        };
        assert!(!err.is_recoverable());
        assert!(EngineError::ConnectionLost.is_recoverable());
    }
}
