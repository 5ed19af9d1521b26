pub mod handlers;
pub mod manager;
