pub mod chats;
pub mod friends;
pub mod sessions;
pub mod users;
pub mod websocket;
