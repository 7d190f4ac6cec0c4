pub mod alarm;
pub mod api_client;
pub mod auth_client;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod payloads;
pub mod session_cache;
pub mod storage;
