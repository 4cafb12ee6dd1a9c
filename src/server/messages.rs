use std::sync::Arc;

use log::{info, warn};

use crate::common::proto::PushEvent;
use crate::common::types::{AttachmentUpload, Message, UserSummary};
use crate::server::error::ServiceError;
use crate::server::push::PushRouter;
use crate::server::store::{MessageStore, NewMessage};
use crate::server::uploads::AttachmentStore;
use crate::server::users::UserDirectory;

/// Orchestrates validation, persistence, attachment delegation and push
/// emission. Persistence success is the only success criterion: push
/// delivery is an optimization layered on top, never a dependency.
pub struct MessageService {
    store: MessageStore,
    users: UserDirectory,
    uploads: Arc<dyn AttachmentStore>,
    push: PushRouter,
    max_message_length: usize,
}

impl MessageService {
    pub fn new(
        store: MessageStore,
        users: UserDirectory,
        uploads: Arc<dyn AttachmentStore>,
        push: PushRouter,
        max_message_length: usize,
    ) -> Self {
        Self {
            store,
            users,
            uploads,
            push,
            max_message_length,
        }
    }

    /// Persist a message and, best-effort, push it to the receiver. The
    /// sender's confirmation never waits on push delivery.
    pub async fn send_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        text: Option<String>,
        attachment: Option<AttachmentUpload>,
    ) -> Result<Message, ServiceError> {
        let text = text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if text.is_none() && attachment.is_none() {
            return Err(ServiceError::EmptyContent);
        }
        if sender_id == receiver_id {
            warn!("[MSG] Blocked self-send from {}", sender_id);
            return Err(ServiceError::SelfSend);
        }
        if let Some(t) = &text {
            if t.chars().count() > self.max_message_length {
                return Err(ServiceError::TextTooLong(self.max_message_length));
            }
        }
        if !self.users.exists(receiver_id).await? {
            return Err(ServiceError::ReceiverNotFound);
        }

        // Upload before persisting: a failed upload must leave no partial
        // message behind.
        let image_url = match attachment {
            Some(upload) => Some(self.uploads.store(upload).await?),
            None => None,
        };

        let message = self
            .store
            .create(NewMessage {
                sender_id: sender_id.to_string(),
                receiver_id: receiver_id.to_string(),
                text,
                image_url,
            })
            .await?;

        info!("[MSG] {} -> {} ({})", sender_id, receiver_id, message.id);
        self.push
            .notify(
                receiver_id,
                PushEvent::NewMessage {
                    message: message.clone(),
                },
            )
            .await;
        Ok(message)
    }

    /// Sender-only delete. Repeating a delete reports not-found rather than
    /// succeeding silently.
    pub async fn delete_message(
        &self,
        requester_id: &str,
        message_id: &str,
    ) -> Result<(), ServiceError> {
        let message = self
            .store
            .find_by_id(message_id)
            .await?
            .ok_or(ServiceError::MessageNotFound)?;
        if message.sender_id != requester_id {
            return Err(ServiceError::NotOwner);
        }
        self.store.delete_by_id(message_id).await?;
        info!("[MSG] {} deleted {}", requester_id, message_id);
        self.push
            .notify(
                &message.receiver_id,
                PushEvent::MessageDeleted {
                    message_id: message.id,
                },
            )
            .await;
        Ok(())
    }

    /// Remove the whole history with a counterpart, both directions. No live
    /// notification is emitted: the counterpart's open view goes stale until
    /// their next fetch.
    pub async fn delete_chat(
        &self,
        requester_id: &str,
        other_user_id: &str,
    ) -> Result<(), ServiceError> {
        let removed = self
            .store
            .delete_all_between(requester_id, other_user_id)
            .await?;
        info!(
            "[MSG] {} cleared chat with {} ({} messages)",
            requester_id, other_user_id, removed
        );
        Ok(())
    }

    /// Full ordered history, no pagination.
    pub async fn list_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<Message>, ServiceError> {
        self.store.find_between(user_a, user_b).await
    }

    /// Everyone the user has exchanged at least one message with.
    pub async fn chat_partners(&self, user_id: &str) -> Result<Vec<UserSummary>, ServiceError> {
        let mut ids = self.store.partner_ids(user_id).await?;
        ids.retain(|id| id != user_id);
        self.users.profiles(&ids).await
    }

    pub async fn list_contacts(&self, user_id: &str) -> Result<Vec<UserSummary>, ServiceError> {
        self.users.list_contacts(user_id).await
    }
}
