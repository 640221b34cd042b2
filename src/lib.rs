//! cardmarket: fantasy player-card marketplace backend.
//!
//! Session authentication (bcrypt + HS256 JWT) in front of an embedded Sled
//! store, with an atomic purchase transaction tying balance debits to
//! ownership records.
//!
//! This lib exposes the storage, auth, and REST layers.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
// REST API module: Axum router, auth middleware, and all HTTP handlers
pub mod rest;
pub mod storage;
