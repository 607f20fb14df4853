//! JSON codec for signaling frames.

use crate::events::{ClientEvent, ServerEvent};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame is not a JSON object with a string `event` field
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// `event` names something outside the closed event set
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// Known event whose payload does not match its schema
    #[error("Invalid payload for {event}: {reason}")]
    InvalidPayload { event: String, reason: String },

    /// Serialization failed
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Decode an inbound frame on the server.
///
/// # Errors
///
/// Returns an error if the frame does not match any [`ClientEvent`] schema.
pub fn decode_client(frame: &str) -> Result<ClientEvent, ProtocolError> {
    decode(frame, CLIENT_EVENTS)
}

/// Decode an inbound frame on the client.
///
/// # Errors
///
/// Returns an error if the frame does not match any [`ServerEvent`] schema.
pub fn decode_server(frame: &str) -> Result<ServerEvent, ProtocolError> {
    decode(frame, SERVER_EVENTS)
}

/// Encode an outbound server frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_server(event: &ServerEvent) -> Result<String, ProtocolError> {
    encode(event)
}

/// Encode an outbound client frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_client(event: &ClientEvent) -> Result<String, ProtocolError> {
    encode(event)
}

const CLIENT_EVENTS: &[&str] = &[
    "join-room",
    "leave-room",
    "chat-message",
    "file-share",
    "mic-muted",
    "mic-unmuted",
    "speaker-muted",
    "speaker-unmuted",
    "speaking-start",
    "speaking-stop",
    "presenter-start",
    "presenter-stop",
    "typing-start",
    "typing-stop",
    "offer",
    "answer",
    "ice-candidate",
    "stop-sharing",
];

const SERVER_EVENTS: &[&str] = &[
    "connected",
    "join-success",
    "join-error",
    "chat-history",
    "chat-message",
    "file-share",
    "file-share-ack",
    "participants-sync",
    "user-joined",
    "user-left",
    "mic-muted",
    "mic-unmuted",
    "speaker-muted",
    "speaker-unmuted",
    "speaking-start",
    "speaking-stop",
    "presenter-start",
    "presenter-stop",
    "existing-presenter",
    "user-typing",
    "user-stopped-typing",
    "offer",
    "answer",
    "ice-candidate",
    "stop-sharing",
    "left-room",
];

fn encode<T: Serialize>(event: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(|e| ProtocolError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(frame: &str, known: &[&str]) -> Result<T, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let event = value
        .get("event")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing event name".to_string()))?
        .to_string();

    if !known.contains(&event.as_str()) {
        return Err(ProtocolError::UnknownEvent(event));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload {
        event,
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::chat::FileShareAck;
    use common::types::ConnectionId;

    #[test]
    fn test_decode_known_event() {
        let event = decode_client(r#"{"event":"typing-stop"}"#).unwrap();
        assert_eq!(event, ClientEvent::TypingStop);
    }

    #[test]
    fn test_decode_not_json() {
        assert!(matches!(
            decode_client("hello"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_missing_event_name() {
        assert!(matches!(
            decode_client(r#"{"data":{}}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_client(r#"{"event":42}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_unknown_event() {
        let err = decode_client(r#"{"event":"self-destruct"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEvent(ref name) if name == "self-destruct"));
    }

    #[test]
    fn test_server_only_event_rejected_from_client() {
        let err = decode_client(r#"{"event":"participants-sync","data":[]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEvent(_)));
    }

    #[test]
    fn test_decode_bad_payload_names_event() {
        let err = decode_client(r#"{"event":"join-room","data":{"roomId":"R1"}}"#).unwrap_err();
        match err {
            ProtocolError::InvalidPayload { event, .. } => assert_eq!(event, "join-room"),
            other => unreachable!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_connection_id_rejected() {
        let err = decode_client(
            r#"{"event":"ice-candidate","data":{"to":"nobody","candidate":{"candidate":"c"},"type":"audio"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn test_encode_server_then_decode_on_client() {
        let id = ConnectionId::new();
        for event in [
            ServerEvent::PresenterStop { id },
            ServerEvent::FileShareAck(FileShareAck::error("nope")),
            ServerEvent::LeftRoom,
        ] {
            let frame = encode_server(&event).unwrap();
            assert_eq!(decode_server(&frame).unwrap(), event);
        }
    }

    #[test]
    fn test_tables_cover_every_variant_name() {
        let id = ConnectionId::new();
        assert!(CLIENT_EVENTS.contains(&ClientEvent::StopSharing { room: None }.name()));
        assert!(SERVER_EVENTS.contains(&ServerEvent::ExistingPresenter { presenter_id: id }.name()));
        assert_eq!(CLIENT_EVENTS.len(), 18);
        assert_eq!(SERVER_EVENTS.len(), 26);
    }
}
