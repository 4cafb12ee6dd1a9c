use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};

use crate::common::proto::{Request, Response};
use crate::server::auth;
use crate::server::database::Database;
use crate::server::error::ServiceError;
use crate::server::messages::MessageService;

/// Request surface: newline-delimited JSON over TCP, one response envelope
/// per request, served sequentially per connection.
pub struct RequestServer {
    pub db: Arc<Database>,
    pub service: Arc<MessageService>,
}

impl RequestServer {
    pub async fn run(&self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("[SERVER] Listening on {}", addr);
        loop {
            let (stream, peer) = listener.accept().await?;
            info!("[SERVER] New connection from {}", peer);
            let db = self.db.clone();
            let service = self.service.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_client(db, service, stream, peer).await {
                    warn!("[SERVER] Client error ({}): {}", peer, e);
                }
            });
        }
    }

    pub async fn handle_request(&self, request: Request) -> Response {
        handle_request(&self.db, &self.service, request).await
    }
}

async fn handle_client(
    db: Arc<Database>,
    service: Arc<MessageService>,
    stream: TcpStream,
    peer: std::net::SocketAddr,
) -> anyhow::Result<()> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            info!("[SERVER] Client disconnected: {}", peer);
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => handle_request(&db, &service, request).await,
            Err(e) => Response::error(400, format!("malformed request: {}", e)),
        };
        let payload = serde_json::to_string(&response)?;
        writer.write_all(payload.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

async fn handle_request(db: &Database, service: &MessageService, request: Request) -> Response {
    match request {
        Request::ListContacts { token } => {
            let user_id = match auth::validate_session(db, &token).await {
                Ok(uid) => uid,
                Err(e) => return failure(e),
            };
            match service.list_contacts(&user_id).await {
                Ok(users) => Response::ok(200, &users),
                Err(e) => failure(e),
            }
        }
        Request::ListChats { token } => {
            let user_id = match auth::validate_session(db, &token).await {
                Ok(uid) => uid,
                Err(e) => return failure(e),
            };
            match service.chat_partners(&user_id).await {
                Ok(users) => Response::ok(200, &users),
                Err(e) => failure(e),
            }
        }
        Request::ListMessages { token, with_user } => {
            let user_id = match auth::validate_session(db, &token).await {
                Ok(uid) => uid,
                Err(e) => return failure(e),
            };
            match service.list_between(&user_id, &with_user).await {
                Ok(messages) => Response::ok(200, &messages),
                Err(e) => failure(e),
            }
        }
        Request::SendMessage {
            token,
            to_user,
            text,
            attachment,
        } => {
            let user_id = match auth::validate_session(db, &token).await {
                Ok(uid) => uid,
                Err(e) => return failure(e),
            };
            match service.send_message(&user_id, &to_user, text, attachment).await {
                Ok(message) => Response::ok(201, &message),
                Err(e) => failure(e),
            }
        }
        Request::DeleteMessage { token, message_id } => {
            let user_id = match auth::validate_session(db, &token).await {
                Ok(uid) => uid,
                Err(e) => return failure(e),
            };
            match service.delete_message(&user_id, &message_id).await {
                Ok(()) => Response::ok(200, &serde_json::json!({ "deleted": message_id })),
                Err(e) => failure(e),
            }
        }
        Request::DeleteChat { token, with_user } => {
            let user_id = match auth::validate_session(db, &token).await {
                Ok(uid) => uid,
                Err(e) => return failure(e),
            };
            match service.delete_chat(&user_id, &with_user).await {
                Ok(()) => Response::ok(200, &serde_json::json!({ "cleared": with_user })),
                Err(e) => failure(e),
            }
        }
    }
}

fn failure(e: ServiceError) -> Response {
    let status = e.status_code();
    if status >= 500 {
        error!("[SERVER] Internal error: {}", e);
    }
    Response::error(status, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::presence::PresenceDirectory;
    use crate::server::push::PushRouter;
    use crate::server::store::MessageStore;
    use crate::server::uploads::{AttachmentStore, DiskAttachments};
    use crate::server::users::UserDirectory;

    struct Fixture {
        server: RequestServer,
        alice_token: String,
        bob: String,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(Database::in_memory().await.unwrap());
        db.migrate().await.unwrap();
        let users = UserDirectory::new((*db).clone());
        let alice = users.create_user("alice").await.unwrap();
        let bob = users.create_user("bob").await.unwrap();
        let alice_token = auth::issue_session(&db, &alice.id, 3600).await.unwrap();

        let presence = PresenceDirectory::new();
        let uploads: Arc<dyn AttachmentStore> = Arc::new(DiskAttachments::new("data/uploads"));
        let service = Arc::new(MessageService::new(
            MessageStore::new((*db).clone()),
            users,
            uploads,
            PushRouter::new(presence),
            2048,
        ));
        Fixture {
            server: RequestServer { db, service },
            alice_token,
            bob: bob.id,
        }
    }

    #[tokio::test]
    async fn send_returns_201_with_the_created_message() {
        let f = fixture().await;
        let response = f
            .server
            .handle_request(Request::SendMessage {
                token: f.alice_token.clone(),
                to_user: f.bob.clone(),
                text: Some("hi".to_string()),
                attachment: None,
            })
            .await;
        assert_eq!(response.status, 201);
        let body = response.body.unwrap();
        assert_eq!(body["text"], "hi");
        assert_eq!(body["receiver_id"], f.bob.as_str());
    }

    #[tokio::test]
    async fn bad_token_is_rejected_with_401() {
        let f = fixture().await;
        let response = f
            .server
            .handle_request(Request::ListContacts {
                token: "bogus".to_string(),
            })
            .await;
        assert_eq!(response.status, 401);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn contract_codes_surface_through_the_envelope() {
        let f = fixture().await;

        let empty = f
            .server
            .handle_request(Request::SendMessage {
                token: f.alice_token.clone(),
                to_user: f.bob.clone(),
                text: None,
                attachment: None,
            })
            .await;
        assert_eq!(empty.status, 400);

        let missing = f
            .server
            .handle_request(Request::DeleteMessage {
                token: f.alice_token.clone(),
                message_id: "no-such-id".to_string(),
            })
            .await;
        assert_eq!(missing.status, 404);
    }
}
