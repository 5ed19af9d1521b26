//! Pairing of waiting users.
//!
//! A match attempt first reads a small window of the oldest queue entries
//! outside any transaction. That read is only a hint and may be stale. The
//! claim itself happens in one transaction that re-reads each candidate's
//! entry and the caller's own entry, so a queue entry is consumed by at most
//! one pairing no matter how many callers race for it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{ChatError, ChatResult};
use crate::models::chats::{
    Chat, Message, CHAT_STARTED_PREVIEW, DEFAULT_CHAT_NAME, WELCOME_MESSAGE,
};
use crate::models::users::{QueueEntry, ANONYMOUS_NICKNAME};
use crate::queries::chats::{chats_collection, messages_collection};
use crate::queries::queue::{candidates_query, queue_entry_path};
use crate::queries::users::stored_nickname_tx;
use crate::store::{encode, with_retries, Store, StoreResult};

use super::presence::{ensure_reachable, Presence};
use super::{display_nickname, ActiveChats, ChatSettings, EndOutcome, SessionManager};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched { chat_id: String, partner_id: String },
    Waiting { already_queued: bool },
}

#[derive(Clone)]
pub struct Matchmaker {
    store: Arc<dyn Store>,
    presence: Arc<dyn Presence>,
    active: ActiveChats,
    sessions: SessionManager,
    settings: ChatSettings,
}

impl Matchmaker {
    pub fn new(
        store: Arc<dyn Store>,
        presence: Arc<dyn Presence>,
        active: ActiveChats,
        sessions: SessionManager,
        settings: ChatSettings,
    ) -> Self {
        Self {
            store,
            presence,
            active,
            sessions,
            settings,
        }
    }

    /// Pair the caller with the oldest available waiting user, or queue them.
    /// A chat the caller still has open is ended first.
    pub async fn start_chat(&self, user_id: &str, nickname: &str) -> ChatResult<MatchOutcome> {
        if user_id.is_empty() {
            return Err(ChatError::Declined("start chat without user id"));
        }
        ensure_reachable(self.presence.as_ref(), user_id)?;

        if let Some(previous) = self.active.get(user_id) {
            match self.sessions.end_chat(&previous, user_id).await {
                Ok(EndOutcome::Refused) => {
                    tracing::debug!(user_id, chat_id = %previous, "Previous chat kept, partners are friends");
                }
                Ok(_) => {}
                Err(ChatError::Store(e)) => return Err(e.into()),
                Err(e) => {
                    tracing::debug!(user_id, chat_id = %previous, error = %e, "Previous chat not ended");
                }
            }
            self.active.clear(user_id);
        }

        let candidates: Vec<String> = self
            .store
            .query(&candidates_query(user_id, self.settings.candidate_window))
            .await?
            .iter()
            .map(|doc| doc.id().to_string())
            .collect();
        let candidates = &candidates;

        let outcome = with_retries(self.settings.max_tx_attempts, move || {
            self.try_match(user_id, nickname, candidates)
        })
        .await?;

        match &outcome {
            MatchOutcome::Matched {
                chat_id,
                partner_id,
            } => {
                self.active.set(user_id, chat_id);
                tracing::info!(user_id, partner_id = %partner_id, chat_id = %chat_id, "Users matched");
            }
            MatchOutcome::Waiting { already_queued } => {
                tracing::info!(user_id, already_queued, "User waiting for a partner");
            }
        }
        Ok(outcome)
    }

    async fn try_match(
        &self,
        user_id: &str,
        nickname: &str,
        candidates: &[String],
    ) -> StoreResult<MatchOutcome> {
        let mut tx = self.store.begin().await?;
        let own_path = queue_entry_path(user_id);
        // Read own entry so a concurrent claim of the caller conflicts.
        let own_entry = tx.get(&own_path).await?;
        let own_nickname = stored_nickname_tx(&mut *tx, user_id)
            .await?
            .unwrap_or_else(|| display_nickname(nickname));

        for candidate in candidates {
            let candidate_path = queue_entry_path(candidate);
            let Some(doc) = tx.get(&candidate_path).await? else {
                continue;
            };
            let entry: QueueEntry = doc.decode()?;
            let partner_nickname = if entry.nickname.trim().is_empty() {
                ANONYMOUS_NICKNAME.to_string()
            } else {
                entry.nickname.clone()
            };

            let now = self.store.server_timestamp();
            let chat_path = chats_collection().new_doc();
            let chat_id = chat_path.id().to_string();
            let chat = Chat {
                id: chat_id.clone(),
                participants: vec![candidate.clone(), user_id.to_string()],
                participant_nicknames: BTreeMap::from([
                    (user_id.to_string(), own_nickname.clone()),
                    (candidate.clone(), partner_nickname),
                ]),
                last_message: CHAT_STARTED_PREVIEW.to_string(),
                last_message_time: now,
                unread_count: 0,
                online: true,
                name: DEFAULT_CHAT_NAME.to_string(),
            };
            let welcome = Message::system(Some(WELCOME_MESSAGE.to_string()), None, now);

            tx.delete(candidate_path);
            if own_entry.is_some() {
                tx.delete(own_path.clone());
            }
            tx.set(chat_path, encode(&chat)?);
            tx.set(messages_collection(&chat_id).new_doc(), encode(&welcome)?);
            tx.commit().await?;

            return Ok(MatchOutcome::Matched {
                chat_id,
                partner_id: candidate.clone(),
            });
        }

        if own_entry.is_some() {
            return Ok(MatchOutcome::Waiting {
                already_queued: true,
            });
        }
        let entry = QueueEntry {
            user_id: user_id.to_string(),
            nickname: own_nickname,
            enqueued_at: self.store.server_timestamp(),
        };
        tx.set(own_path, encode(&entry)?);
        tx.commit().await?;
        Ok(MatchOutcome::Waiting {
            already_queued: false,
        })
    }

    /// Leave the waiting pool. Returns whether an entry was removed.
    pub async fn cancel_search(&self, user_id: &str) -> ChatResult<bool> {
        if user_id.is_empty() {
            return Err(ChatError::Declined("cancel search without user id"));
        }
        let removed = with_retries(self.settings.max_tx_attempts, move || {
            self.try_cancel(user_id)
        })
        .await?;
        tracing::info!(user_id, removed, "Search cancelled");
        Ok(removed)
    }

    async fn try_cancel(&self, user_id: &str) -> StoreResult<bool> {
        let mut tx = self.store.begin().await?;
        let path = queue_entry_path(user_id);
        if tx.get(&path).await?.is_none() {
            return Ok(false);
        }
        tx.delete(path);
        tx.commit().await?;
        Ok(true)
    }

    pub async fn is_waiting(&self, user_id: &str) -> ChatResult<bool> {
        Ok(self.store.get(&queue_entry_path(user_id)).await?.is_some())
    }
}
