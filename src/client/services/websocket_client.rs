use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::common::proto::{AuthFrame, AuthReply, ClientEvent, PushEvent};

#[derive(Debug, Clone, Error)]
pub enum LiveClientError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("event send failed: {0}")]
    SendFailed(String),
    #[error("operation timed out")]
    Timeout,
}

/// Client side of the live gateway: connect, authenticate with the first
/// frame, then split into a reader feeding decoded push events to the app
/// and a writer draining outgoing typing signals.
pub struct LiveClient {
    url: String,
    session_token: Option<String>,
    max_retry_attempts: u32,
    retry_delay: tokio::time::Duration,
    /// Channel feeding decoded push events to the application.
    event_sender: Option<mpsc::UnboundedSender<PushEvent>>,
    event_receiver: Option<mpsc::UnboundedReceiver<PushEvent>>,
    /// Sender for outgoing client events, present once connected.
    outgoing_sender: Option<mpsc::UnboundedSender<ClientEvent>>,
}

impl LiveClient {
    pub fn new(url: String) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            url,
            session_token: None,
            max_retry_attempts: 5,
            retry_delay: tokio::time::Duration::from_secs(2),
            event_sender: Some(tx),
            event_receiver: Some(rx),
            outgoing_sender: None,
        }
    }

    /// Take the application-side receiver; can only be called once.
    pub fn take_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<PushEvent>> {
        self.event_receiver.take()
    }

    pub fn set_session_token(&mut self, token: String) {
        self.session_token = Some(token);
    }

    pub fn is_connected(&self) -> bool {
        self.outgoing_sender.is_some()
    }

    /// Connect and authenticate, retrying the *connection* with exponential
    /// backoff. Nothing here ever retries a user-visible send.
    pub async fn connect_with_auth(&mut self) -> Result<(), LiveClientError> {
        for attempt in 1..=self.max_retry_attempts {
            match self.try_connect().await {
                Ok(outgoing_sender) => {
                    self.outgoing_sender = Some(outgoing_sender);
                    info!("[WS:CLIENT] Connected and authenticated");
                    return Ok(());
                }
                Err(e) => {
                    warn!("[WS:CLIENT] Connection attempt {} failed: {}", attempt, e);
                    // Auth rejections will not improve by retrying.
                    if matches!(e, LiveClientError::AuthenticationFailed(_)) {
                        return Err(e);
                    }
                    if attempt < self.max_retry_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                        self.retry_delay = std::cmp::min(
                            self.retry_delay * 2,
                            tokio::time::Duration::from_secs(30),
                        );
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        Err(LiveClientError::ConnectionFailed(
            "max retry attempts exceeded".to_string(),
        ))
    }

    async fn try_connect(&self) -> Result<mpsc::UnboundedSender<ClientEvent>, LiveClientError> {
        Url::parse(&self.url)
            .map_err(|e| LiveClientError::ConnectionFailed(format!("invalid url: {}", e)))?;

        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| LiveClientError::ConnectionFailed(e.to_string()))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        // First frame: authenticate.
        let token = self
            .session_token
            .clone()
            .ok_or_else(|| LiveClientError::AuthenticationFailed("no session token set".to_string()))?;
        let frame = AuthFrame {
            kind: "auth".to_string(),
            session_token: Some(token),
        };
        let payload = serde_json::to_string(&frame)
            .map_err(|e| LiveClientError::AuthenticationFailed(e.to_string()))?;
        ws_sender
            .send(Message::Text(payload))
            .await
            .map_err(|e| LiveClientError::AuthenticationFailed(e.to_string()))?;

        // Wait for the gateway's verdict.
        let reply = tokio::time::timeout(
            tokio::time::Duration::from_secs(10),
            ws_receiver.next(),
        )
        .await;
        let reply: AuthReply = match reply {
            Ok(Some(Ok(Message::Text(text)))) => serde_json::from_str(&text)
                .map_err(|e| LiveClientError::AuthenticationFailed(format!("bad reply: {}", e)))?,
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                return Err(LiveClientError::AuthenticationFailed(
                    "server closed during auth".to_string(),
                ))
            }
            Ok(Some(Ok(_))) => {
                return Err(LiveClientError::AuthenticationFailed(
                    "unexpected frame during auth".to_string(),
                ))
            }
            Ok(Some(Err(e))) => return Err(LiveClientError::AuthenticationFailed(e.to_string())),
            Err(_) => return Err(LiveClientError::Timeout),
        };
        if !reply.ok {
            let reason = reply.error.unwrap_or_else(|| "rejected".to_string());
            return Err(LiveClientError::AuthenticationFailed(reason));
        }
        info!("[WS:CLIENT] Authenticated as {:?}", reply.user_id);

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<ClientEvent>();

        // Reader: decode pushed events and forward them to the app.
        if let Some(sender) = &self.event_sender {
            let sender = sender.clone();
            tokio::spawn(async move {
                while let Some(message) = ws_receiver.next().await {
                    match message {
                        Ok(Message::Text(text)) => match serde_json::from_str::<PushEvent>(&text) {
                            Ok(event) => {
                                if sender.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("[WS:CLIENT] Unparseable push event: {}", e),
                        },
                        Ok(Message::Close(_)) => break,
                        Err(e) => {
                            warn!("[WS:CLIENT] WebSocket error: {}", e);
                            break;
                        }
                        _ => {}
                    }
                }
                info!("[WS:CLIENT] Event loop ended");
            });
        }

        // Writer: serialize outgoing client events.
        tokio::spawn(async move {
            while let Some(event) = outgoing_rx.recv().await {
                let payload = match serde_json::to_string(&event) {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                if ws_sender.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
        });

        Ok(outgoing_tx)
    }

    pub fn send_event(&self, event: ClientEvent) -> Result<(), LiveClientError> {
        match &self.outgoing_sender {
            Some(sender) => sender
                .send(event)
                .map_err(|_| LiveClientError::SendFailed("connection closed".to_string())),
            None => Err(LiveClientError::SendFailed("not connected".to_string())),
        }
    }

    pub fn typing(&self, receiver_id: &str) -> Result<(), LiveClientError> {
        self.send_event(ClientEvent::Typing {
            receiver_id: receiver_id.to_string(),
        })
    }

    pub fn stop_typing(&self, receiver_id: &str) -> Result<(), LiveClientError> {
        self.send_event(ClientEvent::StopTyping {
            receiver_id: receiver_id.to_string(),
        })
    }
}
