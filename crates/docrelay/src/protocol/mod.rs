use lib0::decoding::{Cursor, Read};
use lib0::encoding::Write;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::{RelayError, RelayResult};

/// An opaque update payload, shared between the room cache and every recipient
/// of a fan-out.
pub type Blob = Arc<Vec<u8>>;

const TAG_DOCUMENT_UPDATE: u8 = 0;
const TAG_AWARENESS_UPDATE: u8 = 1;
const TAG_CONNECTED: u8 = 2;
const TAG_USER_JOINED: u8 = 3;
const TAG_USER_LEFT: u8 = 4;

/// The two kinds of payload a room caches and relays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    /// Document deltas produced by the client-side merge engine
    Document,
    /// Presence and cursor state
    Awareness,
}

impl UpdateKind {
    /// Event name used on the wire and in logs
    pub fn event_name(self) -> &'static str {
        match self {
            UpdateKind::Document => "document-update",
            UpdateKind::Awareness => "awareness-update",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    DocumentUpdate(Vec<u8>),
    AwarenessUpdate(Vec<u8>),
}

impl ClientMessage {
    /// Build the message carrying `payload` for the given kind
    pub fn update(kind: UpdateKind, payload: Vec<u8>) -> Self {
        match kind {
            UpdateKind::Document => ClientMessage::DocumentUpdate(payload),
            UpdateKind::Awareness => ClientMessage::AwarenessUpdate(payload),
        }
    }

    /// Split the message into its kind and raw payload
    pub fn into_update(self) -> (UpdateKind, Vec<u8>) {
        match self {
            ClientMessage::DocumentUpdate(payload) => (UpdateKind::Document, payload),
            ClientMessage::AwarenessUpdate(payload) => (UpdateKind::Awareness, payload),
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// A cached or forwarded document payload
    DocumentUpdate(Blob),
    /// A cached or forwarded awareness payload
    AwarenessUpdate(Blob),
    /// Acknowledgement sent to a client once it has joined its room
    Connected(Connected),
    /// Another client joined the room
    UserJoined(Membership),
    /// A client left the room
    UserLeft(Membership),
}

impl ServerMessage {
    /// Build the update message carrying `payload` for the given kind
    pub fn update(kind: UpdateKind, payload: Blob) -> Self {
        match kind {
            UpdateKind::Document => ServerMessage::DocumentUpdate(payload),
            UpdateKind::Awareness => ServerMessage::AwarenessUpdate(payload),
        }
    }

    /// Event name used in logs
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::DocumentUpdate(_) => UpdateKind::Document.event_name(),
            ServerMessage::AwarenessUpdate(_) => UpdateKind::Awareness.event_name(),
            ServerMessage::Connected(_) => "connected",
            ServerMessage::UserJoined(_) => "user-joined",
            ServerMessage::UserLeft(_) => "user-left",
        }
    }
}

/// Body of the `connected` acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Connected {
    pub message: String,
    pub username: String,
    pub room: String,
    pub users_count: usize,
}

/// Body of `user-joined` and `user-left`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Membership {
    pub username: String,
    pub users_count: usize,
}

/// A message that can be written to and read from a single binary frame.
///
/// A frame is a one byte tag followed by the body. Update bodies are a lib0
/// length-prefixed buffer holding the payload verbatim, control bodies are a
/// lib0 string holding the JSON record.
pub trait Frame: Sized {
    fn write_frame(&self, encoder: &mut Vec<u8>) -> RelayResult<()>;
    fn read_frame(decoder: &mut Cursor<'_>) -> RelayResult<Self>;
}

impl Frame for ClientMessage {
    fn write_frame(&self, encoder: &mut Vec<u8>) -> RelayResult<()> {
        match self {
            ClientMessage::DocumentUpdate(payload) => {
                encoder.write_u8(TAG_DOCUMENT_UPDATE);
                encoder.write_buf(payload);
            }
            ClientMessage::AwarenessUpdate(payload) => {
                encoder.write_u8(TAG_AWARENESS_UPDATE);
                encoder.write_buf(payload);
            }
        }
        Ok(())
    }

    fn read_frame(decoder: &mut Cursor<'_>) -> RelayResult<Self> {
        let kind = match read_tag(decoder)? {
            TAG_DOCUMENT_UPDATE => UpdateKind::Document,
            TAG_AWARENESS_UPDATE => UpdateKind::Awareness,
            other => {
                return Err(RelayError::protocol(format!(
                    "Unknown client message tag: {}",
                    other
                )))
            }
        };
        let payload = read_payload(decoder)?;
        Ok(ClientMessage::update(kind, payload))
    }
}

impl Frame for ServerMessage {
    fn write_frame(&self, encoder: &mut Vec<u8>) -> RelayResult<()> {
        match self {
            ServerMessage::DocumentUpdate(payload) => {
                encoder.write_u8(TAG_DOCUMENT_UPDATE);
                encoder.write_buf(payload.as_slice());
            }
            ServerMessage::AwarenessUpdate(payload) => {
                encoder.write_u8(TAG_AWARENESS_UPDATE);
                encoder.write_buf(payload.as_slice());
            }
            ServerMessage::Connected(body) => {
                encoder.write_u8(TAG_CONNECTED);
                encoder.write_string(&serde_json::to_string(body)?);
            }
            ServerMessage::UserJoined(body) => {
                encoder.write_u8(TAG_USER_JOINED);
                encoder.write_string(&serde_json::to_string(body)?);
            }
            ServerMessage::UserLeft(body) => {
                encoder.write_u8(TAG_USER_LEFT);
                encoder.write_string(&serde_json::to_string(body)?);
            }
        }
        Ok(())
    }

    fn read_frame(decoder: &mut Cursor<'_>) -> RelayResult<Self> {
        let message = match read_tag(decoder)? {
            TAG_DOCUMENT_UPDATE => ServerMessage::DocumentUpdate(Arc::new(read_payload(decoder)?)),
            TAG_AWARENESS_UPDATE => {
                ServerMessage::AwarenessUpdate(Arc::new(read_payload(decoder)?))
            }
            TAG_CONNECTED => ServerMessage::Connected(serde_json::from_str(&read_json(decoder)?)?),
            TAG_USER_JOINED => ServerMessage::UserJoined(serde_json::from_str(&read_json(decoder)?)?),
            TAG_USER_LEFT => ServerMessage::UserLeft(serde_json::from_str(&read_json(decoder)?)?),
            other => {
                return Err(RelayError::protocol(format!(
                    "Unknown server message tag: {}",
                    other
                )))
            }
        };
        Ok(message)
    }
}

fn read_tag(decoder: &mut Cursor<'_>) -> RelayResult<u8> {
    decoder
        .read_u8()
        .map_err(|e| RelayError::protocol(format!("Failed to read message tag: {}", e)))
}

fn read_payload(decoder: &mut Cursor<'_>) -> RelayResult<Vec<u8>> {
    decoder
        .read_buf()
        .map(|buf| buf.to_vec())
        .map_err(|e| RelayError::protocol(format!("Failed to decode lib0 buffer: {}", e)))
}

fn read_json(decoder: &mut Cursor<'_>) -> RelayResult<String> {
    decoder
        .read_string()
        .map(str::to_owned)
        .map_err(|e| RelayError::protocol(format!("Failed to decode lib0 string: {}", e)))
}

/// Encode a message into a single binary frame
pub fn encode_message<T: Frame>(message: &T) -> RelayResult<Vec<u8>> {
    let mut encoder = Vec::new();
    message.write_frame(&mut encoder)?;
    Ok(encoder)
}

/// Decode a message from a single binary frame
pub fn decode_message<T: Frame>(data: &[u8]) -> RelayResult<T> {
    let mut decoder = Cursor::new(data);
    T::read_frame(&mut decoder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_update_payload_is_passed_through_verbatim() {
        let payload = vec![0u8, 255, 1, 2, 3, 0, 0, 128];
        let encoded = encode_message(&ClientMessage::DocumentUpdate(payload.clone())).unwrap();

        let decoded: ClientMessage = assert_ok!(decode_message(&encoded));
        assert_eq!(decoded, ClientMessage::DocumentUpdate(payload));
    }

    #[test]
    fn test_empty_payload_is_a_valid_update() {
        let encoded = encode_message(&ClientMessage::AwarenessUpdate(Vec::new())).unwrap();
        assert_eq!(encoded, vec![TAG_AWARENESS_UPDATE, 0]);

        let decoded: ClientMessage = assert_ok!(decode_message(&encoded));
        assert_eq!(decoded.into_update(), (UpdateKind::Awareness, Vec::new()));
    }

    #[test]
    fn test_server_update_shares_client_framing() {
        // A forwarded payload must be byte-identical to what the sender framed
        let payload = vec![7u8; 300];
        let from_client = encode_message(&ClientMessage::DocumentUpdate(payload.clone())).unwrap();
        let to_peer =
            encode_message(&ServerMessage::DocumentUpdate(Arc::new(payload))).unwrap();
        assert_eq!(from_client, to_peer);
    }

    #[test]
    fn test_control_messages_carry_json_records() {
        let message = ServerMessage::Connected(Connected {
            message: "Welcome alice!".to_string(),
            username: "alice".to_string(),
            room: "doc1".to_string(),
            users_count: 2,
        });
        let encoded = encode_message(&message).unwrap();
        assert_eq!(encoded[0], TAG_CONNECTED);

        let decoded: ServerMessage = assert_ok!(decode_message(&encoded));
        assert_eq!(decoded, message);
        assert_eq!(decoded.event_name(), "connected");
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let mut encoded = vec![TAG_USER_LEFT];
        encoded.write_string(r#"{"username":"bob","users_count":1,"extra":true}"#);

        let result: RelayResult<ServerMessage> = decode_message(&encoded);
        assert!(matches!(assert_err!(result), RelayError::Serialization(_)));
    }

    #[test]
    fn test_unknown_tag_is_a_protocol_error() {
        let result: RelayResult<ClientMessage> = decode_message(&[TAG_CONNECTED, 0]);
        assert!(matches!(result, Err(RelayError::Protocol { .. })));

        let result: RelayResult<ServerMessage> = decode_message(&[42]);
        assert!(matches!(result, Err(RelayError::Protocol { .. })));
    }

    #[test]
    fn test_truncated_frames_are_protocol_errors() {
        let result: RelayResult<ClientMessage> = decode_message(&[]);
        assert!(matches!(result, Err(RelayError::Protocol { .. })));

        // Declares five payload bytes but carries two
        let result: RelayResult<ClientMessage> = decode_message(&[TAG_DOCUMENT_UPDATE, 5, 1, 2]);
        assert!(matches!(result, Err(RelayError::Protocol { .. })));
    }
}
