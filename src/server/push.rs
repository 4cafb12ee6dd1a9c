use log::debug;

use crate::common::proto::PushEvent;
use crate::server::presence::PresenceDirectory;

/// Point-to-point delivery onto a live connection. Strictly fire-and-forget:
/// an offline target or a dead channel is not an error anywhere upstream —
/// the durable store stays the source of truth and the next fetch shows the
/// same state the push would have.
#[derive(Clone)]
pub struct PushRouter {
    presence: PresenceDirectory,
}

impl PushRouter {
    pub fn new(presence: PresenceDirectory) -> Self {
        Self { presence }
    }

    pub async fn notify(&self, user_id: &str, event: PushEvent) {
        match self.presence.lookup(user_id).await {
            Some(conn) => {
                if conn.sender.send(event).is_err() {
                    debug!("[PUSH] Connection for {} gone, dropping event", user_id);
                }
            }
            None => debug!("[PUSH] {} offline, dropping event", user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::presence::LiveConnection;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn delivers_to_the_registered_connection() {
        let presence = PresenceDirectory::new();
        let router = PushRouter::new(presence.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        presence
            .register(LiveConnection {
                connection_id: Uuid::new_v4(),
                user_id: "bob".to_string(),
                sender: tx,
            })
            .await;

        router
            .notify(
                "bob",
                PushEvent::Typing {
                    sender_id: "alice".to_string(),
                },
            )
            .await;

        let event = rx.try_recv().unwrap();
        assert!(matches!(event, PushEvent::Typing { sender_id } if sender_id == "alice"));
    }

    #[tokio::test]
    async fn offline_target_is_a_silent_no_op() {
        let presence = PresenceDirectory::new();
        let router = PushRouter::new(presence);
        // Nobody registered; must neither error nor block.
        router
            .notify(
                "nobody",
                PushEvent::MessageDeleted {
                    message_id: "m1".to_string(),
                },
            )
            .await;
    }

    #[tokio::test]
    async fn dead_receiver_is_swallowed() {
        let presence = PresenceDirectory::new();
        let router = PushRouter::new(presence.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        presence
            .register(LiveConnection {
                connection_id: Uuid::new_v4(),
                user_id: "bob".to_string(),
                sender: tx,
            })
            .await;

        router
            .notify(
                "bob",
                PushEvent::StopTyping {
                    sender_id: "alice".to_string(),
                },
            )
            .await;
    }
}
