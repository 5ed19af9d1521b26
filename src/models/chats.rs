use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender id used for lifecycle events written by the core itself.
pub const SYSTEM_SENDER: &str = "system";

pub const DEFAULT_CHAT_NAME: &str = "Anonymous Chat";
pub const CHAT_STARTED_PREVIEW: &str = "Chat started";
pub const WELCOME_MESSAGE: &str = "You're now chatting with a random stranger. Say hi!";

/// A two-party chat session.
///
/// `online == true` is an active session; `false` means it was ended and is
/// only kept around until the next purge sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub participant_nicknames: BTreeMap<String, String>,
    #[serde(default)]
    pub last_message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_message_time: DateTime<Utc>,
    #[serde(default)]
    pub unread_count: u32,
    pub online: bool,
    #[serde(default)]
    pub name: String,
}

impl Chat {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// The other participant, as seen from `user_id`.
    pub fn partner_of(&self, user_id: &str) -> Option<&str> {
        if !self.has_participant(user_id) {
            return None;
        }
        self.participants
            .iter()
            .map(String::as_str)
            .find(|p| *p != user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    /// Statuses only move forward: sent, then delivered, then read.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        next > self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Voice,
}

impl AttachmentKind {
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("image") {
            AttachmentKind::Image
        } else {
            AttachmentKind::Voice
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub url: String,
}

/// Structured lifecycle events carried by system messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SystemEvent {
    FriendRequestSent {
        request_sender_id: String,
        request_receiver_id: String,
        sender_nickname: String,
    },
    FriendRequestAccepted {
        request_sender_id: String,
        request_receiver_id: String,
    },
    ChatEnded {
        ended_by: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(flatten)]
    pub event: Option<SystemEvent>,
}

impl Message {
    pub fn user(
        sender_id: &str,
        content: Option<String>,
        attachment: Option<Attachment>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            sender_id: sender_id.to_string(),
            content,
            timestamp,
            status: MessageStatus::Sent,
            attachment,
            event: None,
        }
    }

    /// System messages are written already read: there is no recipient to
    /// acknowledge them.
    pub fn system(content: Option<String>, event: Option<SystemEvent>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            sender_id: SYSTEM_SENDER.to_string(),
            content,
            timestamp,
            status: MessageStatus::Read,
            attachment: None,
            event,
        }
    }

    pub fn is_system(&self) -> bool {
        self.sender_id == SYSTEM_SENDER
    }
}
