use serde::{Deserialize, Serialize};

/// A persisted one-to-one message. Immutable once stored; deletion is the
/// only mutation the system knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
    /// Unix milliseconds.
    pub sent_at: i64,
}

impl Message {
    /// The other participant, seen from `user_id`.
    pub fn counterpart_of(&self, user_id: &str) -> &str {
        if self.sender_id == user_id {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
}

/// Raw attachment bytes carried inside a send request, base64-encoded.
/// The durable reference the message ends up with is minted by the
/// attachment store, never by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentUpload {
    pub filename: String,
    pub data: String,
}
