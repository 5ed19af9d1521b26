use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rejection deletes the request document, so it has no stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
}

/// Stored at `friendRequests/{senderId}_{receiverId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: RequestStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub chat_id: String,
}

impl FriendRequest {
    pub fn involves(&self, user_id: &str) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }
}

/// Stored at `friends/{sortedPairId}`. Its existence alone proves the pair
/// are friends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    pub id: String,
    pub participants: Vec<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Friend-request status of a chat partner as seen by one participant.
/// Derived on read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    None,
    Sent,
    Received,
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendStatusView {
    pub status: FriendStatus,
    /// Id of the request to act on, when one is pending or accepted.
    pub request_id: Option<String>,
}

impl FriendStatusView {
    pub fn none() -> Self {
        Self {
            status: FriendStatus::None,
            request_id: None,
        }
    }
}

/// A pending request addressed to the viewer, with the sender's nickname
/// resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingRequest {
    #[serde(flatten)]
    pub request: FriendRequest,
    pub sender_nickname: String,
}
