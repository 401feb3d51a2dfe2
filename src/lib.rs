pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod openapi;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod routes;
pub mod security;
pub mod slug;
pub mod storage; // uploaded media on disk
pub mod telemetry;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
