use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use crate::common::proto::{AuthFrame, AuthReply, ClientEvent, PushEvent};
use crate::server::auth;
use crate::server::database::Database;
use crate::server::error::{AuthError, ServiceError};
use crate::server::presence::{LiveConnection, PresenceDirectory};
use crate::server::push::PushRouter;

/// Live gateway: authenticates each new WebSocket connection, registers it
/// in the presence directory, pushes events out and relays typing signals
/// point-to-point. Nothing that flows through here is persisted.
pub struct LiveGateway {
    db: Arc<Database>,
    presence: PresenceDirectory,
    push: PushRouter,
}

impl LiveGateway {
    pub fn new(db: Arc<Database>, presence: PresenceDirectory, push: PushRouter) -> Self {
        Self { db, presence, push }
    }

    pub async fn run(&self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("[WS] Live gateway listening on {}", addr);
        loop {
            let (stream, peer) = listener.accept().await?;
            info!("[WS] New connection from {}", peer);
            let db = self.db.clone();
            let presence = self.presence.clone();
            let push = self.push.clone();
            tokio::spawn(async move {
                match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws_stream) => {
                        if let Err(e) = handle_connection(db, presence, push, ws_stream).await {
                            warn!("[WS] Connection error ({}): {}", peer, e);
                        }
                    }
                    Err(e) => warn!("[WS] Handshake failed ({}): {}", peer, e),
                }
            });
        }
    }
}

async fn handle_connection(
    db: Arc<Database>,
    presence: PresenceDirectory,
    push: PushRouter,
    ws_stream: WebSocketStream<TcpStream>,
) -> anyhow::Result<()> {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // The first frame must authenticate; anything else is a rejection with
    // the specific reason echoed back.
    let first = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        ws_receiver.next(),
    )
    .await;

    let credential: Result<String, AuthError> = match first {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<AuthFrame>(&text) {
            Ok(frame) if frame.kind == "auth" => match frame.session_token {
                Some(token) if !token.trim().is_empty() => Ok(token),
                _ => Err(AuthError::MissingToken),
            },
            _ => Err(AuthError::MissingCredential),
        },
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
            info!("[WS:AUTH] Client closed before authenticating");
            return Ok(());
        }
        Ok(Some(Ok(_))) => Err(AuthError::MissingCredential),
        Ok(Some(Err(e))) => return Err(e.into()),
        Err(_) => {
            warn!("[WS:AUTH] Authentication timeout");
            Err(AuthError::MissingCredential)
        }
    };

    let verified: Result<String, AuthError> = match credential {
        Ok(token) => match auth::validate_session(&db, &token).await {
            Ok(user_id) => Ok(user_id),
            Err(ServiceError::Unauthenticated(reason)) => Err(reason),
            Err(e) => {
                let reply = AuthReply {
                    kind: "auth_reply".to_string(),
                    ok: false,
                    user_id: None,
                    error: Some("internal error".to_string()),
                };
                let _ = ws_sender
                    .send(Message::Text(serde_json::to_string(&reply)?))
                    .await;
                return Err(e.into());
            }
        },
        Err(reason) => Err(reason),
    };

    let user_id = match verified {
        Ok(user_id) => {
            let reply = AuthReply {
                kind: "auth_reply".to_string(),
                ok: true,
                user_id: Some(user_id.clone()),
                error: None,
            };
            ws_sender
                .send(Message::Text(serde_json::to_string(&reply)?))
                .await?;
            info!("[WS:AUTH] Authenticated user {}", user_id);
            user_id
        }
        Err(reason) => {
            let reply = AuthReply {
                kind: "auth_reply".to_string(),
                ok: false,
                user_id: None,
                error: Some(reason.to_string()),
            };
            let _ = ws_sender
                .send(Message::Text(serde_json::to_string(&reply)?))
                .await;
            warn!("[WS:AUTH] Rejected connection: {}", reason);
            return Ok(());
        }
    };

    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<PushEvent>();
    presence
        .register(LiveConnection {
            connection_id,
            user_id: user_id.clone(),
            sender: tx,
        })
        .await;

    // Writer: drain pushed events onto the socket.
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if ws_sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    // Reader: relay typing signals to the named counterpart, nobody else.
    let relay_push = push.clone();
    let relay_user = user_id.clone();
    let receive_task = tokio::spawn(async move {
        while let Some(message) = ws_receiver.next().await {
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(ClientEvent::Typing { receiver_id }) => {
                        relay_push
                            .notify(
                                &receiver_id,
                                PushEvent::Typing {
                                    sender_id: relay_user.clone(),
                                },
                            )
                            .await;
                    }
                    Ok(ClientEvent::StopTyping { receiver_id }) => {
                        relay_push
                            .notify(
                                &receiver_id,
                                PushEvent::StopTyping {
                                    sender_id: relay_user.clone(),
                                },
                            )
                            .await;
                    }
                    Err(e) => warn!("[WS] Unparseable client event: {}", e),
                },
                Ok(Message::Close(_)) => break,
                Err(_) => break,
                _ => {}
            }
        }
    });

    // Either half ending means the connection is done.
    tokio::select! {
        _ = send_task => {},
        _ = receive_task => {},
    }

    if presence.unregister(&user_id, connection_id).await {
        info!("[WS] {} disconnected", user_id);
    }
    Ok(())
}
