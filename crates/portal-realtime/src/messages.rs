//! Channel protocol frames.

use serde::{Deserialize, Serialize};

/// Frame types on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireMessageType {
    // Connection
    Auth,
    AuthResult,
    Error,

    // Server-pushed and client-emitted events
    Event,
    Ack,

    // Rooms
    JoinRoom,
    LeaveRoom,
    SendMessage,

    // Keepalive
    Heartbeat,
}

/// A frame sent to/from the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub msg_type: WireMessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl WireMessage {
    /// Create a bare frame of the given type.
    pub fn new(msg_type: WireMessageType) -> Self {
        Self {
            msg_type,
            event: None,
            payload: None,
            room: None,
            ack_id: None,
            error: None,
            success: None,
        }
    }

    /// Create an auth handshake frame.
    pub fn auth(access_token: &str, client_id: &str) -> Self {
        Self {
            payload: Some(serde_json::json!({
                "token": access_token,
                "clientId": client_id
            })),
            ..Self::new(WireMessageType::Auth)
        }
    }

    /// Create an event frame.
    pub fn event(name: &str, payload: serde_json::Value, ack_id: Option<u64>) -> Self {
        Self {
            event: Some(name.to_string()),
            payload: Some(payload),
            ack_id,
            ..Self::new(WireMessageType::Event)
        }
    }

    /// Create a JOIN_ROOM frame.
    pub fn join_room(room: &str) -> Self {
        Self {
            room: Some(room.to_string()),
            ..Self::new(WireMessageType::JoinRoom)
        }
    }

    /// Create a LEAVE_ROOM frame.
    pub fn leave_room(room: &str) -> Self {
        Self {
            room: Some(room.to_string()),
            ..Self::new(WireMessageType::LeaveRoom)
        }
    }

    /// Create a SEND_MESSAGE frame.
    pub fn send_message(room: &str, payload: serde_json::Value) -> Self {
        Self {
            room: Some(room.to_string()),
            payload: Some(payload),
            ..Self::new(WireMessageType::SendMessage)
        }
    }

    /// Create a HEARTBEAT frame.
    pub fn heartbeat() -> Self {
        Self::new(WireMessageType::Heartbeat)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_frame() {
        let msg = WireMessage::auth("token123", "client456");
        let json = msg.to_json().unwrap();

        assert!(json.contains("\"type\":\"auth\""));
        assert!(json.contains("\"token\":\"token123\""));
        assert!(json.contains("\"clientId\":\"client456\""));
    }

    #[test]
    fn test_event_frame_with_ack() {
        let msg = WireMessage::event(
            "send_message",
            serde_json::json!({"text": "hello"}),
            Some(7),
        );
        let json = msg.to_json().unwrap();

        assert!(json.contains("\"type\":\"event\""));
        assert!(json.contains("\"event\":\"send_message\""));
        assert!(json.contains("\"ackId\":7"));
    }

    #[test]
    fn test_room_frames() {
        let join = WireMessage::join_room("program-42").to_json().unwrap();
        assert!(join.contains("\"type\":\"join_room\""));
        assert!(join.contains("\"room\":\"program-42\""));

        let leave = WireMessage::leave_room("program-42").to_json().unwrap();
        assert!(leave.contains("\"type\":\"leave_room\""));

        let send = WireMessage::send_message("program-42", serde_json::json!({"text": "hi"}))
            .to_json()
            .unwrap();
        assert!(send.contains("\"type\":\"send_message\""));
        assert!(send.contains("\"text\":\"hi\""));
    }

    #[test]
    fn test_heartbeat_frame_is_minimal() {
        let json = WireMessage::heartbeat().to_json().unwrap();
        assert_eq!(json, r#"{"type":"heartbeat"}"#);
    }

    #[test]
    fn test_deserialize_auth_result() {
        let json = r#"{"type":"auth_result","success":true}"#;
        let msg = WireMessage::from_json(json).unwrap();

        assert_eq!(msg.msg_type, WireMessageType::AuthResult);
        assert_eq!(msg.success, Some(true));
    }

    #[test]
    fn test_deserialize_pushed_event() {
        let json = r#"{"type":"event","event":"unread_count","payload":{"unreadCount":3}}"#;
        let msg = WireMessage::from_json(json).unwrap();

        assert_eq!(msg.msg_type, WireMessageType::Event);
        assert_eq!(msg.event.as_deref(), Some("unread_count"));
        assert_eq!(msg.payload.unwrap()["unreadCount"], 3);
    }

    #[test]
    fn test_error_frame() {
        let json = r#"{"type":"error","error":"room full"}"#;
        let msg = WireMessage::from_json(json).unwrap();

        assert_eq!(msg.msg_type, WireMessageType::Error);
        assert_eq!(msg.error.as_deref(), Some("room full"));
    }

    #[test]
    fn test_frame_roundtrip() {
        let original = WireMessage::event("new_notification", serde_json::json!({"id": 9}), None);
        let parsed = WireMessage::from_json(&original.to_json().unwrap()).unwrap();

        assert_eq!(parsed.msg_type, WireMessageType::Event);
        assert_eq!(parsed.event.as_deref(), Some("new_notification"));
        assert!(parsed.ack_id.is_none());
    }
}
