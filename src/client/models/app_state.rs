use crate::common::proto::PushEvent;
use crate::common::types::Message;

/// A locally generated entry waiting for server confirmation. `temp_id`
/// lives in its own namespace (`temp-<uuid>`) so it can never collide with
/// a server-issued id.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDraft {
    pub temp_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    /// Local-only preview reference for an attachment; the canonical URL
    /// arrives with the confirmed message.
    pub preview: Option<String>,
    pub sent_at: i64,
}

impl LocalDraft {
    pub fn new(
        sender_id: &str,
        receiver_id: &str,
        text: Option<String>,
        preview: Option<String>,
    ) -> Self {
        Self {
            temp_id: format!("temp-{}", uuid::Uuid::new_v4()),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            text,
            preview,
            sent_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// One slot in the open conversation: either awaiting confirmation or
/// already server truth. The tagged split keeps reconciliation and dedup
/// exhaustive.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEntry {
    Optimistic(LocalDraft),
    Confirmed(Message),
}

impl ViewEntry {
    pub fn id(&self) -> &str {
        match self {
            ViewEntry::Optimistic(draft) => &draft.temp_id,
            ViewEntry::Confirmed(message) => &message.id,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        matches!(self, ViewEntry::Optimistic(_))
    }
}

/// The open conversation as the local user sees it: confirmed history plus
/// any in-flight drafts, and the counterpart's typing render flag.
#[derive(Debug, Default)]
pub struct ConversationView {
    pub partner_id: String,
    entries: Vec<ViewEntry>,
    pub partner_typing: bool,
}

impl ConversationView {
    pub fn open(partner_id: impl Into<String>) -> Self {
        Self {
            partner_id: partner_id.into(),
            entries: Vec::new(),
            partner_typing: false,
        }
    }

    /// Replace the confirmed history after a successful fetch; in-flight
    /// drafts stay at the tail. A failed fetch never calls this, so the
    /// existing view survives it untouched.
    pub fn load_history(&mut self, messages: Vec<Message>) {
        let drafts: Vec<ViewEntry> = self
            .entries
            .drain(..)
            .filter(ViewEntry::is_optimistic)
            .collect();
        self.entries = messages.into_iter().map(ViewEntry::Confirmed).collect();
        self.entries.extend(drafts);
    }

    /// Append an optimistic draft. Must run synchronously with the submit
    /// action, before the request goes out.
    pub fn begin_send(
        &mut self,
        sender_id: &str,
        text: Option<String>,
        preview: Option<String>,
    ) -> LocalDraft {
        let draft = LocalDraft::new(sender_id, &self.partner_id, text, preview);
        self.entries.push(ViewEntry::Optimistic(draft.clone()));
        draft
    }

    /// The request succeeded: swap the draft for the server's message,
    /// preserving its position in the sequence.
    pub fn confirm_send(&mut self, temp_id: &str, message: Message) {
        if let Some(slot) = self.entries.iter_mut().find(|e| e.id() == temp_id) {
            *slot = ViewEntry::Confirmed(message);
        }
    }

    /// The request failed: the draft disappears. Retrying is a new explicit
    /// send, never automatic.
    pub fn fail_send(&mut self, temp_id: &str) {
        self.entries.retain(|e| e.id() != temp_id);
    }

    fn contains_id(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id() == id)
    }

    /// Merge one pushed event. Events for other conversations are ignored,
    /// duplicate message ids are dropped without changing the view, and a
    /// delete for an unknown id is a no-op.
    pub fn apply_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::NewMessage { message } => {
                if message.sender_id != self.partner_id {
                    return;
                }
                // A message from the counterpart supersedes their typing
                // indicator.
                self.partner_typing = false;
                if self.contains_id(&message.id) {
                    return;
                }
                self.entries.push(ViewEntry::Confirmed(message));
            }
            PushEvent::MessageDeleted { message_id } => {
                self.entries.retain(|e| e.id() != message_id);
            }
            PushEvent::Typing { sender_id } => {
                if sender_id == self.partner_id {
                    self.partner_typing = true;
                }
            }
            PushEvent::StopTyping { sender_id } => {
                if sender_id == self.partner_id {
                    self.partner_typing = false;
                }
            }
        }
    }

    pub fn entries(&self) -> &[ViewEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_message(id: &str, from: &str, to: &str, text: &str) -> Message {
        Message {
            id: id.to_string(),
            sender_id: from.to_string(),
            receiver_id: to.to_string(),
            text: Some(text.to_string()),
            image_url: None,
            sent_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn begin_send_is_visible_immediately() {
        let mut view = ConversationView::open("bob");
        let draft = view.begin_send("alice", Some("hi".to_string()), None);
        assert_eq!(view.len(), 1);
        assert!(draft.temp_id.starts_with("temp-"));
        assert!(view.entries()[0].is_optimistic());
    }

    #[test]
    fn confirm_preserves_position() {
        let mut view = ConversationView::open("bob");
        let first = view.begin_send("alice", Some("first".to_string()), None);
        let _second = view.begin_send("alice", Some("second".to_string()), None);

        view.confirm_send(&first.temp_id, server_message("m1", "alice", "bob", "first"));

        assert_eq!(view.len(), 2);
        assert_eq!(view.entries()[0].id(), "m1");
        assert!(view.entries()[1].is_optimistic());
    }

    #[test]
    fn failed_send_rolls_back_its_draft_only() {
        let mut view = ConversationView::open("bob");
        view.load_history(vec![server_message("m1", "bob", "alice", "hello")]);
        let draft = view.begin_send("alice", Some("oops".to_string()), None);

        view.fail_send(&draft.temp_id);
        assert_eq!(view.len(), 1);
        assert_eq!(view.entries()[0].id(), "m1");
    }

    #[test]
    fn duplicate_push_leaves_length_unchanged() {
        let mut view = ConversationView::open("bob");
        let incoming = server_message("m1", "bob", "alice", "hi");
        view.apply_push(PushEvent::NewMessage {
            message: incoming.clone(),
        });
        view.apply_push(PushEvent::NewMessage { message: incoming });
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn push_for_another_conversation_is_ignored() {
        let mut view = ConversationView::open("bob");
        view.apply_push(PushEvent::NewMessage {
            message: server_message("m1", "carol", "alice", "wrong room"),
        });
        assert!(view.is_empty());
    }

    #[test]
    fn delete_push_is_a_noop_when_absent() {
        let mut view = ConversationView::open("bob");
        view.load_history(vec![server_message("m1", "bob", "alice", "keep me")]);
        view.apply_push(PushEvent::MessageDeleted {
            message_id: "already-gone".to_string(),
        });
        assert_eq!(view.len(), 1);

        view.apply_push(PushEvent::MessageDeleted {
            message_id: "m1".to_string(),
        });
        assert!(view.is_empty());
    }

    #[test]
    fn typing_flag_follows_events_and_clears_on_arrival() {
        let mut view = ConversationView::open("bob");
        view.apply_push(PushEvent::Typing {
            sender_id: "bob".to_string(),
        });
        assert!(view.partner_typing);

        // Someone else typing does not touch this conversation.
        view.apply_push(PushEvent::StopTyping {
            sender_id: "carol".to_string(),
        });
        assert!(view.partner_typing);

        view.apply_push(PushEvent::NewMessage {
            message: server_message("m1", "bob", "alice", "here it is"),
        });
        assert!(!view.partner_typing);
    }

    #[test]
    fn history_reload_keeps_inflight_drafts() {
        let mut view = ConversationView::open("bob");
        let draft = view.begin_send("alice", Some("pending".to_string()), None);
        view.load_history(vec![server_message("m1", "bob", "alice", "old")]);

        assert_eq!(view.len(), 2);
        assert_eq!(view.entries()[0].id(), "m1");
        assert_eq!(view.entries()[1].id(), draft.temp_id);
    }
}
