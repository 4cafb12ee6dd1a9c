use anyhow::{anyhow, Context};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use crate::common::proto::{Request, Response};
use crate::common::types::{AttachmentUpload, Message, UserSummary};

type Pending = (Request, oneshot::Sender<anyhow::Result<Response>>);

/// Request-side client. A background task owns the connection and serves
/// requests sequentially. Transport failures surface to the caller as-is:
/// there is no transparent resend, a retry is always a new user action.
#[derive(Default)]
pub struct ChatClient {
    /// Sender used to hand a request to the background task and wait for
    /// its response.
    tx: Option<mpsc::UnboundedSender<Pending>>,
    /// Keep the background task handle so it stays alive with the client.
    _bg: Option<tokio::task::JoinHandle<()>>,
}

impl ChatClient {
    pub fn new() -> Self {
        Self { tx: None, _bg: None }
    }

    /// Drop the connection and background task; the next call re-dials.
    pub fn reset(&mut self) {
        self.tx = None;
        self._bg = None;
    }

    async fn ensure_connected(&mut self, host: &str) -> anyhow::Result<()> {
        if self.tx.is_some() {
            return Ok(());
        }

        let stream = TcpStream::connect(host)
            .await
            .with_context(|| format!("connect to {}", host))?;
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut writer = BufWriter::new(writer);

        let (tx, mut rx) = mpsc::unbounded_channel::<Pending>();

        let handle = tokio::spawn(async move {
            let mut line = String::new();
            while let Some((request, resp_tx)) = rx.recv().await {
                let outcome = async {
                    let payload = serde_json::to_string(&request)?;
                    writer.write_all(payload.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await?;

                    line.clear();
                    let n = reader.read_line(&mut line).await?;
                    if n == 0 {
                        return Err(anyhow!("server closed the connection"));
                    }
                    let response: Response = serde_json::from_str(line.trim())?;
                    Ok(response)
                }
                .await;
                let failed = outcome.is_err();
                let _ = resp_tx.send(outcome);
                if failed {
                    // The stream state is unknown after a failure; end the
                    // task and let the next call re-dial.
                    break;
                }
            }
        });

        self.tx = Some(tx);
        self._bg = Some(handle);
        Ok(())
    }

    async fn roundtrip(&mut self, host: &str, request: Request) -> anyhow::Result<Response> {
        self.ensure_connected(host).await?;
        let (resp_tx, resp_rx) = oneshot::channel();
        let sent = match &self.tx {
            Some(tx) => tx.send((request, resp_tx)).is_ok(),
            None => false,
        };
        if !sent {
            self.reset();
            return Err(anyhow!("connection lost"));
        }
        let outcome = resp_rx
            .await
            .map_err(|_| anyhow!("response channel closed before response"))?;
        if outcome.is_err() {
            self.reset();
        }
        outcome
    }

    fn expect_success(response: Response) -> anyhow::Result<Response> {
        if response.is_success() {
            Ok(response)
        } else {
            let detail = response
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            Err(anyhow!("{} {}", response.status, detail))
        }
    }

    fn body<T: serde::de::DeserializeOwned>(response: Response) -> anyhow::Result<T> {
        let body = response.body.ok_or_else(|| anyhow!("empty response body"))?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn send_message(
        &mut self,
        host: &str,
        token: &str,
        to_user: &str,
        text: Option<String>,
        attachment: Option<AttachmentUpload>,
    ) -> anyhow::Result<Message> {
        let response = self
            .roundtrip(
                host,
                Request::SendMessage {
                    token: token.to_string(),
                    to_user: to_user.to_string(),
                    text,
                    attachment,
                },
            )
            .await?;
        Self::body(Self::expect_success(response)?)
    }

    pub async fn list_messages(
        &mut self,
        host: &str,
        token: &str,
        with_user: &str,
    ) -> anyhow::Result<Vec<Message>> {
        let response = self
            .roundtrip(
                host,
                Request::ListMessages {
                    token: token.to_string(),
                    with_user: with_user.to_string(),
                },
            )
            .await?;
        Self::body(Self::expect_success(response)?)
    }

    pub async fn list_contacts(
        &mut self,
        host: &str,
        token: &str,
    ) -> anyhow::Result<Vec<UserSummary>> {
        let response = self
            .roundtrip(
                host,
                Request::ListContacts {
                    token: token.to_string(),
                },
            )
            .await?;
        Self::body(Self::expect_success(response)?)
    }

    pub async fn chat_partners(
        &mut self,
        host: &str,
        token: &str,
    ) -> anyhow::Result<Vec<UserSummary>> {
        let response = self
            .roundtrip(
                host,
                Request::ListChats {
                    token: token.to_string(),
                },
            )
            .await?;
        Self::body(Self::expect_success(response)?)
    }

    pub async fn delete_message(
        &mut self,
        host: &str,
        token: &str,
        message_id: &str,
    ) -> anyhow::Result<()> {
        let response = self
            .roundtrip(
                host,
                Request::DeleteMessage {
                    token: token.to_string(),
                    message_id: message_id.to_string(),
                },
            )
            .await?;
        Self::expect_success(response)?;
        Ok(())
    }

    pub async fn delete_chat(
        &mut self,
        host: &str,
        token: &str,
        with_user: &str,
    ) -> anyhow::Result<()> {
        let response = self
            .roundtrip(
                host,
                Request::DeleteChat {
                    token: token.to_string(),
                    with_user: with_user.to_string(),
                },
            )
            .await?;
        Self::expect_success(response)?;
        Ok(())
    }
}
