// src/server/main.rs
// Entry point for the filodiretto server
use std::sync::Arc;

use filodiretto::server::config::ServerConfig;
use filodiretto::server::connection::RequestServer;
use filodiretto::server::database::Database;
use filodiretto::server::messages::MessageService;
use filodiretto::server::presence::PresenceDirectory;
use filodiretto::server::push::PushRouter;
use filodiretto::server::store::MessageStore;
use filodiretto::server::uploads::DiskAttachments;
use filodiretto::server::users::UserDirectory;
use filodiretto::server::websocket::LiveGateway;
use filodiretto::server::auth;
use filodiretto::utils::performance;
use log::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configura logging
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    std::env::set_var("RUST_LOG", &log_level);
    env_logger::init();

    let config = ServerConfig::from_env();

    let database = Arc::new(Database::connect(&config.database_url).await?);
    info!("🗄️ Running database migrations...");
    database.migrate().await.map_err(|e| {
        error!("Database migration failed: {}", e);
        e
    })?;
    info!("✅ Database migrations completed");

    let presence = PresenceDirectory::new();
    let push = PushRouter::new(presence.clone());
    let store = MessageStore::new((*database).clone());
    let users = UserDirectory::new((*database).clone());
    let uploads = Arc::new(DiskAttachments::new(&config.upload_dir));
    let service = Arc::new(MessageService::new(
        store.clone(),
        users,
        uploads,
        push.clone(),
        config.max_message_length,
    ));

    // Start performance logger in background
    let perf_log_path = std::env::var("PERFORMANCE_LOG_PATH")
        .unwrap_or_else(|_| "data/filodiretto_performance.log".to_string());
    let perf_store = store.clone();
    let perf_presence = presence.clone();
    tokio::spawn(async move {
        info!("📊 Starting performance logger - logging every 120 seconds to: {}", perf_log_path);
        performance::start_performance_logger(perf_store, perf_presence, &perf_log_path).await;
    });

    // Periodic session cleanup
    let cleanup_db = database.clone();
    tokio::spawn(async move {
        loop {
            auth::cleanup_expired_sessions(&cleanup_db).await;
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
    });

    // Live gateway on its own listener, one port above the request server
    let ws_addr = format!("{}:{}", config.host, config.websocket_port());
    let gateway = LiveGateway::new(database.clone(), presence.clone(), push.clone());
    tokio::spawn(async move {
        if let Err(e) = gateway.run(&ws_addr).await {
            error!("Live gateway error: {}", e);
        }
    });
    info!("Live gateway started on {}:{}", config.host, config.websocket_port());

    let server = RequestServer {
        db: database.clone(),
        service,
    };
    server.run(&format!("{}:{}", config.host, config.port)).await?;
    Ok(())
}
