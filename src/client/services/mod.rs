pub mod chat_service;
pub mod websocket_client;
