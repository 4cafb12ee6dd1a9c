use filodiretto::server::config::ServerConfig;
use filodiretto::server::database::Database;
use sqlx::Row;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    println!("Connecting to {}", config.database_url);
    let db = Database::connect(&config.database_url).await?;

    println!("\n-- users --");
    let rows = sqlx::query("SELECT id, username, created_at FROM users")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let id: String = r.try_get("id").unwrap_or_default();
        let username: String = r.try_get("username").unwrap_or_default();
        let created_at: i64 = r.try_get("created_at").unwrap_or(0);
        println!("id={} username={} created_at={}", id, username, created_at);
    }

    println!("\n-- sessions --");
    let rows = sqlx::query("SELECT user_id, session_token, expires_at FROM sessions")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let user_id: String = r.try_get("user_id").unwrap_or_default();
        let token: String = r.try_get("session_token").unwrap_or_default();
        let expires_at: i64 = r.try_get("expires_at").unwrap_or(0);
        let masked = if token.len() > 8 { &token[..8] } else { token.as_str() };
        println!("user_id={} token={}... expires_at={}", user_id, masked, expires_at);
    }

    println!("\n-- messages (last 10) --");
    let rows = sqlx::query(
        "SELECT id, sender_id, receiver_id, text, image_url, sent_at FROM messages \
         ORDER BY sent_at DESC LIMIT 10",
    )
    .fetch_all(&db.pool)
    .await?;
    for r in rows.iter() {
        let id: String = r.try_get("id").unwrap_or_default();
        let sender_id: String = r.try_get("sender_id").unwrap_or_default();
        let receiver_id: String = r.try_get("receiver_id").unwrap_or_default();
        let text: Option<String> = r.try_get("text").unwrap_or(None);
        let image_url: Option<String> = r.try_get("image_url").unwrap_or(None);
        let sent_at: i64 = r.try_get("sent_at").unwrap_or(0);
        println!(
            "id={} {}->{} text_len={} image={} sent_at={}",
            id,
            sender_id,
            receiver_id,
            text.map(|t| t.len()).unwrap_or(0),
            image_url.is_some(),
            sent_at
        );
    }

    Ok(())
}
