//! Pipeline coverage: the durable store and the live push channel observed
//! together, from both participants' points of view.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use filodiretto::client::models::app_state::ConversationView;
use filodiretto::common::proto::PushEvent;
use filodiretto::server::database::Database;
use filodiretto::server::error::{ServiceError, UploadError};
use filodiretto::server::messages::MessageService;
use filodiretto::server::presence::{LiveConnection, PresenceDirectory};
use filodiretto::server::push::PushRouter;
use filodiretto::server::store::MessageStore;
use filodiretto::server::uploads::AttachmentStore;
use filodiretto::server::users::UserDirectory;

struct NullAttachments;

#[async_trait::async_trait]
impl AttachmentStore for NullAttachments {
    async fn store(
        &self,
        _upload: filodiretto::common::types::AttachmentUpload,
    ) -> Result<String, UploadError> {
        Ok("uploads/ref.png".to_string())
    }
}

struct Harness {
    service: MessageService,
    presence: PresenceDirectory,
    alice: String,
    bob: String,
}

async fn harness() -> Harness {
    let db = Database::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    let users = UserDirectory::new(db.clone());
    let alice = users.create_user("alice").await.unwrap().id;
    let bob = users.create_user("bob").await.unwrap().id;
    let presence = PresenceDirectory::new();
    let service = MessageService::new(
        MessageStore::new(db),
        users,
        Arc::new(NullAttachments),
        PushRouter::new(presence.clone()),
        2048,
    );
    Harness {
        service,
        presence,
        alice,
        bob,
    }
}

async fn go_online(h: &Harness, user_id: &str) -> (Uuid, mpsc::UnboundedReceiver<PushEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connection_id = Uuid::new_v4();
    h.presence
        .register(LiveConnection {
            connection_id,
            user_id: user_id.to_string(),
            sender: tx,
        })
        .await;
    (connection_id, rx)
}

#[tokio::test]
async fn optimistic_send_confirms_and_the_push_dedups() {
    let h = harness().await;
    let (_conn, mut bob_events) = go_online(&h, &h.bob).await;

    // Alice's side: draft appears before any I/O completes.
    let mut alice_view = ConversationView::open(h.bob.clone());
    let draft = alice_view.begin_send(&h.alice, Some("hi".to_string()), None);
    assert_eq!(alice_view.len(), 1);

    // The request lands; her draft becomes the confirmed message in place.
    let sent = h
        .service
        .send_message(&h.alice, &h.bob, Some("hi".to_string()), None)
        .await
        .unwrap();
    alice_view.confirm_send(&draft.temp_id, sent.clone());
    assert_eq!(alice_view.entries()[0].id(), sent.id);
    assert_eq!(alice_view.len(), 1);

    // Bob's side: the push carries the same server id and text.
    let mut bob_view = ConversationView::open(h.alice.clone());
    let event = bob_events.try_recv().unwrap();
    match &event {
        PushEvent::NewMessage { message } => {
            assert_eq!(message.id, sent.id);
            assert_eq!(message.text.as_deref(), Some("hi"));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    bob_view.apply_push(event.clone());
    assert_eq!(bob_view.len(), 1);

    // A replayed push changes nothing.
    bob_view.apply_push(event);
    assert_eq!(bob_view.len(), 1);
}

#[tokio::test]
async fn delete_reaches_an_online_counterpart_live() {
    let h = harness().await;
    let sent = h
        .service
        .send_message(&h.alice, &h.bob, Some("retracted".to_string()), None)
        .await
        .unwrap();

    let (_conn, mut bob_events) = go_online(&h, &h.bob).await;
    let mut bob_view = ConversationView::open(h.alice.clone());
    bob_view.load_history(h.service.list_between(&h.bob, &h.alice).await.unwrap());
    assert_eq!(bob_view.len(), 1);

    h.service.delete_message(&h.alice, &sent.id).await.unwrap();
    bob_view.apply_push(bob_events.try_recv().unwrap());
    assert!(bob_view.is_empty());
}

#[tokio::test]
async fn offline_counterpart_sees_the_delete_on_next_fetch() {
    let h = harness().await;
    let sent = h
        .service
        .send_message(&h.alice, &h.bob, Some("short-lived".to_string()), None)
        .await
        .unwrap();

    // Bob is offline: no push, but the store is authoritative.
    h.service.delete_message(&h.alice, &sent.id).await.unwrap();

    let mut bob_view = ConversationView::open(h.alice.clone());
    bob_view.load_history(h.service.list_between(&h.bob, &h.alice).await.unwrap());
    assert!(bob_view.is_empty());
}

#[tokio::test]
async fn chat_deletion_leaves_the_open_view_stale_until_reload() {
    let h = harness().await;
    h.service
        .send_message(&h.alice, &h.bob, Some("one".to_string()), None)
        .await
        .unwrap();
    h.service
        .send_message(&h.bob, &h.alice, Some("two".to_string()), None)
        .await
        .unwrap();

    let (_conn, mut bob_events) = go_online(&h, &h.bob).await;
    let mut bob_view = ConversationView::open(h.alice.clone());
    bob_view.load_history(h.service.list_between(&h.bob, &h.alice).await.unwrap());
    assert_eq!(bob_view.len(), 2);

    h.service.delete_chat(&h.alice, &h.bob).await.unwrap();

    // No event arrives; the open view is stale by design.
    assert!(bob_events.try_recv().is_err());
    assert_eq!(bob_view.len(), 2);

    // The next full fetch shows the truth.
    bob_view.load_history(h.service.list_between(&h.bob, &h.alice).await.unwrap());
    assert!(bob_view.is_empty());
}

#[tokio::test]
async fn reconnect_routes_pushes_to_the_newest_connection_only() {
    let h = harness().await;
    let (_old_conn, mut old_events) = go_online(&h, &h.bob).await;
    let (_new_conn, mut new_events) = go_online(&h, &h.bob).await;

    h.service
        .send_message(&h.alice, &h.bob, Some("where does this land?".to_string()), None)
        .await
        .unwrap();

    // Only the most recent registration receives the event.
    assert!(old_events.try_recv().is_err());
    assert!(matches!(
        new_events.try_recv().unwrap(),
        PushEvent::NewMessage { .. }
    ));
}

#[tokio::test]
async fn send_failure_is_isolated_to_the_caller() {
    let h = harness().await;
    let mut alice_view = ConversationView::open(h.bob.clone());
    let draft = alice_view.begin_send(&h.alice, Some("   ".to_string()), None);

    let err = h
        .service
        .send_message(&h.alice, &h.bob, Some("   ".to_string()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::EmptyContent));

    alice_view.fail_send(&draft.temp_id);
    assert!(alice_view.is_empty());
    assert!(h.service.list_between(&h.alice, &h.bob).await.unwrap().is_empty());
}
