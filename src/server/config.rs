use std::env;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub upload_dir: String,
    pub max_message_length: usize,
    pub session_ttl_secs: i64,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(5000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/filodiretto.db".to_string()),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "data/uploads".to_string()),
            max_message_length: env::var("MAX_MESSAGE_LENGTH").ok().and_then(|v| v.parse().ok()).unwrap_or(2048),
            session_ttl_secs: env::var("SESSION_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(60 * 60 * 24 * 7),
        }
    }

    /// Live gateway listens next to the request port.
    pub fn websocket_port(&self) -> u16 {
        self.port + 1
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub default_host: String,
    pub default_port: u16,
    pub websocket_host: String,
    pub websocket_port: u16,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            default_host: env::var("CLIENT_DEFAULT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            default_port: env::var("CLIENT_DEFAULT_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(5000),
            websocket_host: env::var("WEBSOCKET_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            websocket_port: env::var("WEBSOCKET_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(5001),
        }
    }
}
