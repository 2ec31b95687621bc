pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod openapi;
pub mod ownership;
pub mod rate_limit;
pub mod reactions;
pub mod repo;
pub mod routes;
pub mod security;
pub mod storage;
pub mod threads;

// wiring used by main and the integration tests
pub use routes::{configure, AppState};
pub use security::SecurityHeaders;
