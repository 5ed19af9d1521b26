//! The chat core: matchmaking, chat sessions and friend requests over a
//! [`Store`].

pub mod active;
pub mod friends;
pub mod matchmaking;
pub mod presence;
pub mod sessions;

use std::sync::Arc;
use std::time::Duration;

use crate::blobs::BlobStore;
use crate::store::Store;

pub use active::ActiveChats;
pub use friends::{FriendRequests, RejectOutcome};
pub use matchmaking::{MatchOutcome, Matchmaker};
pub use presence::{AlwaysReachable, Presence};
pub use sessions::{EndOutcome, SessionManager};

/// Tunables of the chat core.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// How many of the oldest queue entries a match attempt looks at.
    pub candidate_window: usize,
    pub max_tx_attempts: u32,
    /// Delay before a sent message is promoted to delivered.
    pub delivery_delay: Duration,
    pub sweep_interval: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            candidate_window: 5,
            max_tx_attempts: 5,
            delivery_delay: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Everything a UI layer needs to drive the chat core.
#[derive(Clone)]
pub struct ChatServices {
    pub store: Arc<dyn Store>,
    pub active: ActiveChats,
    pub matchmaking: Matchmaker,
    pub sessions: SessionManager,
    pub friends: FriendRequests,
    pub settings: ChatSettings,
}

impl ChatServices {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        presence: Arc<dyn Presence>,
        settings: ChatSettings,
    ) -> Self {
        let active = ActiveChats::new();
        let sessions = SessionManager::new(
            store.clone(),
            blobs,
            presence.clone(),
            active.clone(),
            settings.clone(),
        );
        let matchmaking = Matchmaker::new(
            store.clone(),
            presence.clone(),
            active.clone(),
            sessions.clone(),
            settings.clone(),
        );
        let friends = FriendRequests::new(store.clone(), presence, settings.clone());
        Self {
            store,
            active,
            matchmaking,
            sessions,
            friends,
            settings,
        }
    }
}

/// Display name for a user-supplied nickname.
pub(crate) fn display_nickname(nickname: &str) -> String {
    let trimmed = nickname.trim();
    if trimmed.is_empty() {
        crate::models::users::ANONYMOUS_NICKNAME.to_string()
    } else {
        trimmed.to_string()
    }
}
