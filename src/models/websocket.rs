use serde::{Deserialize, Serialize};

use crate::models::chats::{Chat, Message};
use crate::models::friends::{FriendStatusView, IncomingRequest};

/// Snapshots pushed to a connected client. Every variant carries the full
/// current value, never a diff.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ChatList {
        chats: Vec<Chat>,
    },
    ActiveChat {
        chat_id: Option<String>,
    },
    Messages {
        chat_id: String,
        messages: Vec<Message>,
    },
    FriendStatus {
        chat_id: String,
        #[serde(flatten)]
        view: FriendStatusView,
    },
    IncomingRequests {
        requests: Vec<IncomingRequest>,
    },
    Error {
        message: String,
    },
    Pong,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SelectChat { chat_id: String },
    SendMessage { chat_id: String, content: String },
    MarkRead { chat_id: String },
    Ping,
}
