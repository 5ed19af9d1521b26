//! Anonymous stranger chat: matchmaking, chat sessions and friend requests
//! over a transactional document store, plus the axum server exposing them.

pub mod app_state;
pub mod blobs;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middlewares;
pub mod models;
pub mod queries;
pub mod routes;
pub mod services;
pub mod store;
pub mod websocket;

pub use error::{ChatError, ChatResult};
pub use services::{ChatServices, ChatSettings};
