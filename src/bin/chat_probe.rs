use filodiretto::client::services::chat_service::ChatClient;
use filodiretto::client::services::websocket_client::LiveClient;
use filodiretto::server::auth;
use filodiretto::server::config::{ClientConfig, ServerConfig};
use filodiretto::server::database::Database;
use filodiretto::server::users::UserDirectory;

/// End-to-end smoke against a running server: seed two accounts, send,
/// observe the push, delete, fetch again.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let server_cfg = ServerConfig::from_env();
    let client_cfg = ClientConfig::from_env();
    let host = format!("{}:{}", client_cfg.default_host, client_cfg.default_port);
    println!("Using host {}", host);

    // Seed two throwaway accounts straight in the server database; identity
    // issuance is the provider's job, not the messaging core's.
    let db = Database::connect(&server_cfg.database_url).await?;
    db.migrate().await?;
    let users = UserDirectory::new(db.clone());
    let suffix = uuid::Uuid::new_v4().to_string();
    let alice = users.create_user(&format!("alice-{}", &suffix[..8])).await?;
    let bob = users.create_user(&format!("bob-{}", &suffix[..8])).await?;
    let alice_token = auth::issue_session(&db, &alice.id, server_cfg.session_ttl_secs).await?;
    let bob_token = auth::issue_session(&db, &bob.id, server_cfg.session_ttl_secs).await?;
    println!("Seeded users {} and {}", alice.username, bob.username);

    // Bob listens on the live gateway.
    let ws_url = format!(
        "ws://{}:{}",
        client_cfg.websocket_host, client_cfg.websocket_port
    );
    let mut bob_live = LiveClient::new(ws_url);
    bob_live.set_session_token(bob_token);
    let mut bob_events = bob_live.take_receiver().expect("fresh receiver");
    bob_live.connect_with_auth().await?;

    // Alice sends over the request surface.
    let mut alice_client = ChatClient::new();
    let message = alice_client
        .send_message(
            &host,
            &alice_token,
            &bob.id,
            Some("hi from the probe".to_string()),
            None,
        )
        .await?;
    println!("SEND -> {} at {}", message.id, message.sent_at);

    match tokio::time::timeout(std::time::Duration::from_secs(5), bob_events.recv()).await {
        Ok(Some(event)) => println!("PUSH -> {:?}", event),
        Ok(None) => println!("PUSH -> channel closed"),
        Err(_) => println!("PUSH -> nothing within 5s"),
    }

    let history = alice_client
        .list_messages(&host, &alice_token, &bob.id)
        .await?;
    println!("HISTORY -> {} messages", history.len());

    alice_client
        .delete_message(&host, &alice_token, &message.id)
        .await?;
    println!("DELETE -> ok");

    match tokio::time::timeout(std::time::Duration::from_secs(5), bob_events.recv()).await {
        Ok(Some(event)) => println!("PUSH -> {:?}", event),
        Ok(None) => println!("PUSH -> channel closed"),
        Err(_) => println!("PUSH -> nothing within 5s"),
    }

    let history = alice_client
        .list_messages(&host, &alice_token, &bob.id)
        .await?;
    println!("HISTORY AFTER DELETE -> {} messages", history.len());

    Ok(())
}
