use serde::{Deserialize, Serialize};

use crate::common::types::{AttachmentUpload, Message};

/// One request per line on the request socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ListContacts {
        token: String,
    },
    ListChats {
        token: String,
    },
    ListMessages {
        token: String,
        with_user: String,
    },
    SendMessage {
        token: String,
        to_user: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        attachment: Option<AttachmentUpload>,
    },
    DeleteMessage {
        token: String,
        message_id: String,
    },
    DeleteChat {
        token: String,
        with_user: String,
    },
}

/// Response envelope. `status` carries the same codes an HTTP surface would;
/// they are part of the contract, not decoration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok<T: Serialize>(status: u16, body: &T) -> Self {
        Self {
            status,
            body: serde_json::to_value(body).ok(),
            error: None,
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Server-to-client live events, pushed over the gateway connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PushEvent {
    NewMessage { message: Message },
    MessageDeleted { message_id: String },
    Typing { sender_id: String },
    StopTyping { sender_id: String },
}

/// Client-to-server live events. Ephemeral: these never touch the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    Typing { receiver_id: String },
    StopTyping { receiver_id: String },
}

/// First frame a client must send on the live connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthFrame {
    pub kind: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

/// Gateway's answer to the auth frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthReply {
    pub kind: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_the_wire_contract() {
        let event = PushEvent::StopTyping {
            sender_id: "u1".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "stopTyping");

        let event = PushEvent::MessageDeleted {
            message_id: "m1".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "messageDeleted");
        assert_eq!(value["message_id"], "m1");
    }

    #[test]
    fn error_envelope_omits_body() {
        let response = Response::error(404, "message not found");
        let raw = serde_json::to_string(&response).unwrap();
        assert!(!raw.contains("body"));
        assert!(!Response::error(500, "boom").is_success());
        assert!(Response::ok(201, &serde_json::json!({"id": "m1"})).is_success());
    }
}
