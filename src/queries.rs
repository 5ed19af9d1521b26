//! Typed document addressing and lookups over the store.

pub mod chats;
pub mod friends;
pub mod queue;
pub mod users;

pub const CHATS: &str = "chats";
pub const MESSAGES: &str = "messages";
pub const CHAT_QUEUE: &str = "chat-queue";
pub const FRIEND_REQUESTS: &str = "friendRequests";
pub const FRIENDS: &str = "friends";
pub const USERS: &str = "users";
