use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::common::proto::PushEvent;

/// Handle to one live client connection. Events sent here are drained onto
/// the socket by the gateway's writer task.
#[derive(Debug, Clone)]
pub struct LiveConnection {
    pub connection_id: Uuid,
    pub user_id: String,
    pub sender: mpsc::UnboundedSender<PushEvent>,
}

// Mappa user_id -> connessione attiva (una sola per utente)
#[derive(Clone, Default)]
pub struct PresenceDirectory {
    inner: Arc<Mutex<HashMap<String, LiveConnection>>>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register the user's current connection. Last writer wins; the
    /// displaced entry (if any) is returned so the caller can tear it down.
    pub async fn register(&self, conn: LiveConnection) -> Option<LiveConnection> {
        let mut map = self.inner.lock().await;
        let user_id = conn.user_id.clone();
        let displaced = map.insert(user_id.clone(), conn);
        if displaced.is_some() {
            info!("[PRESENCE] {} re-registered; previous connection displaced", user_id);
        } else {
            info!("[PRESENCE] {} registered", user_id);
        }
        displaced
    }

    /// Remove the user's entry only if it still belongs to this connection.
    /// A reconnect may already have overwritten it, and that newer entry
    /// must survive the old connection's teardown.
    pub async fn unregister(&self, user_id: &str, connection_id: Uuid) -> bool {
        let mut map = self.inner.lock().await;
        match map.get(user_id) {
            Some(current) if current.connection_id == connection_id => {
                map.remove(user_id);
                info!("[PRESENCE] {} unregistered", user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn lookup(&self, user_id: &str) -> Option<LiveConnection> {
        self.inner.lock().await.get(user_id).cloned()
    }

    pub async fn online_count(&self) -> usize {
        self.inner.lock().await.len()
    }
}
