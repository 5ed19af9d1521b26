//! Chat session lifecycle: ACTIVE (`online = true`) to ENDED
//! (`online = false`) to PURGED (deleted). Messages and read receipts live
//! here too.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::blobs::{sanitize_file_name, BlobStore, Upload};
use crate::error::{ChatError, ChatResult};
use crate::models::chats::{Attachment, AttachmentKind, Chat, Message, MessageStatus, SystemEvent};
use crate::queries::chats::{
    chat_path, chats_collection, decode_chats, decode_messages, ended_chats_query, get_chat,
    get_chat_tx, latest_message_from_query, list_active_chats, messages_collection,
    messages_not_from_query, messages_query,
};
use crate::queries::friends::friendship_exists_tx;
use crate::store::{encode, watch, with_retries, DocPath, Store, StoreResult, Subscription};

use super::presence::{ensure_reachable, Presence};
use super::{ActiveChats, ChatSettings};

/// Result of an end-chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOutcome {
    Ended,
    /// The participants are friends; the chat stays active.
    Refused,
    AlreadyEnded,
    /// The chat no longer exists.
    Missing,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    presence: Arc<dyn Presence>,
    active: ActiveChats,
    settings: ChatSettings,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        presence: Arc<dyn Presence>,
        active: ActiveChats,
        settings: ChatSettings,
    ) -> Self {
        Self {
            store,
            blobs,
            presence,
            active,
            settings,
        }
    }

    /// End an active chat unless its participants are friends.
    pub async fn end_chat(&self, chat_id: &str, user_id: &str) -> ChatResult<EndOutcome> {
        if chat_id.is_empty() || user_id.is_empty() {
            return Err(ChatError::Declined("end chat without chat or user id"));
        }
        ensure_reachable(self.presence.as_ref(), user_id)?;

        let outcome = with_retries(self.settings.max_tx_attempts, move || {
            self.try_end(chat_id, user_id)
        })
        .await??;

        if outcome != EndOutcome::Refused {
            self.active.clear_if(user_id, chat_id);
        }
        tracing::info!(chat_id, user_id, ?outcome, "End chat");
        Ok(outcome)
    }

    async fn try_end(&self, chat_id: &str, user_id: &str) -> StoreResult<ChatResult<EndOutcome>> {
        let mut tx = self.store.begin().await?;
        let Some(chat) = get_chat_tx(&mut *tx, chat_id).await? else {
            return Ok(Ok(EndOutcome::Missing));
        };
        if !chat.has_participant(user_id) {
            return Ok(Err(ChatError::NotParticipant));
        }
        if !chat.online {
            return Ok(Ok(EndOutcome::AlreadyEnded));
        }
        if let Some(partner) = chat.partner_of(user_id) {
            if friendship_exists_tx(&mut *tx, user_id, partner).await? {
                return Ok(Ok(EndOutcome::Refused));
            }
        }

        let now = self.store.server_timestamp();
        let ended = Message::system(
            None,
            Some(SystemEvent::ChatEnded {
                ended_by: user_id.to_string(),
            }),
            now,
        );
        tx.set(messages_collection(chat_id).new_doc(), encode(&ended)?);
        tx.update(
            chat_path(chat_id),
            json!({ "online": false, "lastMessageTime": now.timestamp_millis() }),
        );
        tx.commit().await?;
        Ok(Ok(EndOutcome::Ended))
    }

    /// Hard-delete a chat and its messages at a participant's request.
    pub async fn delete_chat(&self, chat_id: &str, user_id: &str) -> ChatResult<bool> {
        if chat_id.is_empty() || user_id.is_empty() {
            return Err(ChatError::Declined("delete chat without chat or user id"));
        }
        let Some(chat) = get_chat(self.store.as_ref(), chat_id).await? else {
            self.active.clear_if(user_id, chat_id);
            return Ok(false);
        };
        if !chat.has_participant(user_id) {
            return Err(ChatError::NotParticipant);
        }

        let removed = self.remove_chat(chat_id, false).await?;
        self.active.clear_if(user_id, chat_id);
        tracing::info!(chat_id, user_id, removed, "Deleted chat");
        Ok(removed)
    }

    /// Append a message from `user_id`. Text, an attachment, or both are
    /// required; otherwise the call is declined.
    pub async fn send_message(
        &self,
        chat_id: &str,
        user_id: &str,
        content: Option<String>,
        upload: Option<Upload>,
    ) -> ChatResult<Message> {
        let content = content.filter(|c| !c.trim().is_empty());
        if chat_id.is_empty() || user_id.is_empty() {
            return Err(ChatError::Declined("send message without chat or user id"));
        }
        if content.is_none() && upload.is_none() {
            return Err(ChatError::Declined("empty message"));
        }
        ensure_reachable(self.presence.as_ref(), user_id)?;

        // Check before uploading so a refused message leaves no orphan blob.
        let chat = get_chat(self.store.as_ref(), chat_id)
            .await?
            .ok_or(ChatError::ChatNotFound)?;
        check_writable(&chat, user_id)?;

        let attachment = match upload {
            Some(upload) => Some(self.upload_attachment(chat_id, upload).await?),
            None => None,
        };

        let content = &content;
        let attachment = &attachment;
        let message = with_retries(self.settings.max_tx_attempts, move || {
            self.try_append(chat_id, user_id, content, attachment)
        })
        .await??;

        tracing::debug!(chat_id, user_id, message_id = %message.id, "Message sent");
        self.schedule_delivery(chat_id, user_id);
        Ok(message)
    }

    async fn upload_attachment(&self, chat_id: &str, upload: Upload) -> ChatResult<Attachment> {
        let path = format!(
            "chat-attachments/{}/{}_{}",
            chat_id,
            Utc::now().timestamp_millis(),
            sanitize_file_name(&upload.file_name)
        );
        let kind = AttachmentKind::from_content_type(&upload.content_type);
        let url = self
            .blobs
            .upload(&path, upload.bytes, &upload.content_type)
            .await
            .map_err(|e| ChatError::Blob(e.to_string()))?;
        Ok(Attachment { kind, url })
    }

    async fn try_append(
        &self,
        chat_id: &str,
        user_id: &str,
        content: &Option<String>,
        attachment: &Option<Attachment>,
    ) -> StoreResult<ChatResult<Message>> {
        let mut tx = self.store.begin().await?;
        let Some(chat) = get_chat_tx(&mut *tx, chat_id).await? else {
            return Ok(Err(ChatError::ChatNotFound));
        };
        if let Err(e) = check_writable(&chat, user_id) {
            return Ok(Err(e));
        }

        let now = self.store.server_timestamp();
        let mut message = Message::user(user_id, content.clone(), attachment.clone(), now);
        let path = messages_collection(chat_id).new_doc();
        tx.set(path.clone(), encode(&message)?);
        tx.update(
            chat_path(chat_id),
            json!({
                "lastMessage": preview(content, attachment),
                "lastMessageTime": now.timestamp_millis(),
            }),
        );
        tx.commit().await?;

        message.id = path.id().to_string();
        Ok(Ok(message))
    }

    /// After the configured delay, promote the sender's latest message in
    /// the chat to delivered. Best effort.
    fn schedule_delivery(&self, chat_id: &str, user_id: &str) {
        let store = self.store.clone();
        let delay = self.settings.delivery_delay;
        let attempts = self.settings.max_tx_attempts;
        let chat_id = chat_id.to_string();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = promote_latest(store.as_ref(), &chat_id, &user_id, attempts).await {
                tracing::debug!(chat_id = %chat_id, user_id = %user_id, error = %e, "Delivery promotion skipped");
            }
        });
    }

    /// Mark every message the user did not write as read and reset the
    /// chat's unread counter. Returns how many messages changed.
    pub async fn mark_read(&self, chat_id: &str, user_id: &str) -> ChatResult<usize> {
        if chat_id.is_empty() || user_id.is_empty() {
            return Err(ChatError::Declined("mark read without chat or user id"));
        }
        let docs = self
            .store
            .query(&messages_not_from_query(chat_id, user_id))
            .await?;
        let paths: Vec<DocPath> = docs.into_iter().map(|doc| doc.path).collect();
        let paths = &paths;

        let count = with_retries(self.settings.max_tx_attempts, move || {
            self.try_mark_read(chat_id, user_id, paths)
        })
        .await??;
        if count > 0 {
            tracing::debug!(chat_id, user_id, count, "Marked messages read");
        }
        Ok(count)
    }

    async fn try_mark_read(
        &self,
        chat_id: &str,
        user_id: &str,
        paths: &[DocPath],
    ) -> StoreResult<ChatResult<usize>> {
        let mut tx = self.store.begin().await?;
        let Some(chat) = get_chat_tx(&mut *tx, chat_id).await? else {
            return Ok(Err(ChatError::ChatNotFound));
        };
        if !chat.has_participant(user_id) {
            return Ok(Err(ChatError::NotParticipant));
        }

        let mut count = 0;
        for path in paths {
            let Some(doc) = tx.get(path).await? else {
                continue;
            };
            let message: Message = doc.decode()?;
            if message.status.can_advance_to(MessageStatus::Read) {
                tx.update(path.clone(), json!({ "status": MessageStatus::Read }));
                count += 1;
            }
        }
        if chat.unread_count != 0 {
            tx.update(chat_path(chat_id), json!({ "unreadCount": 0 }));
        }
        tx.commit().await?;
        Ok(Ok(count))
    }

    /// Delete every ended chat `user_id` takes part in, with its messages.
    pub async fn purge_ended(&self, user_id: &str) -> ChatResult<usize> {
        let docs = self.store.query(&ended_chats_query(user_id)).await?;
        let mut purged = 0;
        for chat in decode_chats(&docs)? {
            if self.remove_chat(&chat.id, true).await? {
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::info!(user_id, purged, "Purged ended chats");
        }
        Ok(purged)
    }

    /// Run [`Self::purge_ended`] for `user_id` every sweep interval until the
    /// returned handle is aborted. The first sweep happens one full interval
    /// after the call.
    pub fn spawn_sweeper(&self, user_id: &str) -> JoinHandle<()> {
        let sessions = self.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            let period = sessions.settings.sweep_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if let Err(e) = sessions.purge_ended(&user_id).await {
                    tracing::warn!(user_id = %user_id, error = %e, "Purge sweep failed");
                }
            }
        })
    }

    /// Delete a chat and the messages listed at call time. With
    /// `only_if_ended`, the chat must still be offline inside the
    /// transaction.
    async fn remove_chat(&self, chat_id: &str, only_if_ended: bool) -> ChatResult<bool> {
        let docs = self.store.query(&messages_query(chat_id)).await?;
        let messages: Vec<DocPath> = docs.into_iter().map(|doc| doc.path).collect();
        let messages = &messages;

        let removed = with_retries(self.settings.max_tx_attempts, move || {
            self.try_remove(chat_id, only_if_ended, messages)
        })
        .await?;
        Ok(removed)
    }

    async fn try_remove(
        &self,
        chat_id: &str,
        only_if_ended: bool,
        messages: &[DocPath],
    ) -> StoreResult<bool> {
        let mut tx = self.store.begin().await?;
        let Some(chat) = get_chat_tx(&mut *tx, chat_id).await? else {
            return Ok(false);
        };
        if only_if_ended && chat.online {
            return Ok(false);
        }
        for path in messages {
            tx.delete(path.clone());
        }
        tx.delete(chat_path(chat_id));
        tx.commit().await?;
        Ok(true)
    }

    pub async fn messages(&self, chat_id: &str, user_id: &str) -> ChatResult<Vec<Message>> {
        let chat = get_chat(self.store.as_ref(), chat_id)
            .await?
            .ok_or(ChatError::ChatNotFound)?;
        if !chat.has_participant(user_id) {
            return Err(ChatError::NotParticipant);
        }
        Ok(crate::queries::chats::list_messages(self.store.as_ref(), chat_id).await?)
    }

    pub async fn active_chats(&self, user_id: &str) -> ChatResult<Vec<Chat>> {
        Ok(list_active_chats(self.store.as_ref(), user_id).await?)
    }

    /// Live list of the user's active chats.
    pub fn watch_chat_list(&self, user_id: &str) -> Subscription<Vec<Chat>> {
        let user_id = user_id.to_string();
        watch(self.store.clone(), vec![chats_collection()], move |store| {
            let user_id = user_id.clone();
            async move { list_active_chats(store.as_ref(), &user_id).await }
        })
    }

    /// Live, timestamp-ordered messages of one chat.
    pub fn watch_messages(&self, chat_id: &str) -> Subscription<Vec<Message>> {
        let query = messages_query(chat_id);
        watch(
            self.store.clone(),
            vec![query.collection.clone()],
            move |store| {
                let query = query.clone();
                async move { decode_messages(&store.query(&query).await?) }
            },
        )
    }

    /// Keep the active-chat pointer consistent with a fresh chat list: with
    /// nothing selected and exactly one active chat, select it. Returns the
    /// pointer after reconciliation.
    pub fn reconcile_active(&self, user_id: &str, chats: &[Chat]) -> Option<String> {
        match (self.active.get(user_id), chats) {
            (None, [only]) => {
                self.active.set(user_id, &only.id);
                tracing::debug!(user_id, chat_id = %only.id, "Auto-activated chat");
                Some(only.id.clone())
            }
            (current, _) => current,
        }
    }

    /// Point the user at one of their chats.
    pub async fn select_chat(&self, chat_id: &str, user_id: &str) -> ChatResult<()> {
        let chat = get_chat(self.store.as_ref(), chat_id)
            .await?
            .ok_or(ChatError::ChatNotFound)?;
        if !chat.has_participant(user_id) {
            return Err(ChatError::NotParticipant);
        }
        self.active.set(user_id, chat_id);
        Ok(())
    }

    pub fn active(&self) -> &ActiveChats {
        &self.active
    }
}

fn check_writable(chat: &Chat, user_id: &str) -> ChatResult<()> {
    if !chat.has_participant(user_id) {
        return Err(ChatError::NotParticipant);
    }
    if !chat.online {
        return Err(ChatError::ChatEnded);
    }
    Ok(())
}

fn preview(content: &Option<String>, attachment: &Option<Attachment>) -> String {
    match (content, attachment) {
        (Some(text), _) => text.clone(),
        (None, Some(a)) if a.kind == AttachmentKind::Image => "Image".to_string(),
        (None, Some(_)) => "Voice message".to_string(),
        (None, None) => String::new(),
    }
}

async fn promote_latest(
    store: &dyn Store,
    chat_id: &str,
    sender_id: &str,
    attempts: u32,
) -> StoreResult<()> {
    let Some(latest) = store
        .query(&latest_message_from_query(chat_id, sender_id))
        .await?
        .into_iter()
        .next()
    else {
        return Ok(());
    };
    let path = &latest.path;
    with_retries(attempts, move || try_promote(store, path, MessageStatus::Delivered)).await
}

async fn try_promote(store: &dyn Store, path: &DocPath, next: MessageStatus) -> StoreResult<()> {
    let mut tx = store.begin().await?;
    let Some(doc) = tx.get(path).await? else {
        return Ok(());
    };
    let message: Message = doc.decode()?;
    if message.status.can_advance_to(next) {
        tx.update(path.clone(), json!({ "status": next }));
        tx.commit().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::friends::Friendship;
    use crate::queries::chats::{get_chat, list_messages};
    use crate::queries::friends::friendship_path;
    use crate::services::testing::{services, OfflineUsers};
    use crate::services::{AlwaysReachable, ChatServices, MatchOutcome};
    use crate::store::MemoryStore;

    async fn paired(services: &ChatServices) -> String {
        services.matchmaking.start_chat("alice", "Alice").await.unwrap();
        match services.matchmaking.start_chat("bob", "Bob").await.unwrap() {
            MatchOutcome::Matched { chat_id, .. } => chat_id,
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ending_a_chat_appends_event_and_goes_offline() {
        let (store, services) = services();
        let chat_id = paired(&services).await;

        let outcome = services.sessions.end_chat(&chat_id, "bob").await.unwrap();
        assert_eq!(outcome, EndOutcome::Ended);
        assert_eq!(services.active.get("bob"), None);

        let chat = get_chat(&store, &chat_id).await.unwrap().unwrap();
        assert!(!chat.online);
        let messages = list_messages(&store, &chat_id).await.unwrap();
        assert_eq!(
            messages.last().and_then(|m| m.event.clone()),
            Some(SystemEvent::ChatEnded {
                ended_by: "bob".to_string()
            })
        );

        let again = services.sessions.end_chat(&chat_id, "alice").await.unwrap();
        assert_eq!(again, EndOutcome::AlreadyEnded);
    }

    #[tokio::test]
    async fn friends_cannot_end_their_chat() {
        let (store, services) = services();
        let chat_id = paired(&services).await;
        let friendship = Friendship {
            id: String::new(),
            participants: vec!["alice".into(), "bob".into()],
            created_at: Utc::now(),
        };
        store
            .set(&friendship_path("bob", "alice"), encode(&friendship).unwrap())
            .await
            .unwrap();

        let outcome = services.sessions.end_chat(&chat_id, "alice").await.unwrap();
        assert_eq!(outcome, EndOutcome::Refused);
        assert!(get_chat(&store, &chat_id).await.unwrap().unwrap().online);
    }

    #[tokio::test]
    async fn empty_messages_are_declined_without_writes() {
        let (store, services) = services();
        let chat_id = paired(&services).await;
        let before = list_messages(&store, &chat_id).await.unwrap().len();

        let result = services
            .sessions
            .send_message(&chat_id, "alice", Some("   ".into()), None)
            .await;
        assert!(matches!(result, Err(ChatError::Declined(_))));
        assert_eq!(list_messages(&store, &chat_id).await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn sent_message_updates_chat_then_becomes_delivered() {
        let (store, services) = services();
        let chat_id = paired(&services).await;

        let sent = services
            .sessions
            .send_message(&chat_id, "alice", Some("hi".into()), None)
            .await
            .unwrap();
        assert_eq!(sent.status, MessageStatus::Sent);

        let chat = get_chat(&store, &chat_id).await.unwrap().unwrap();
        assert_eq!(chat.last_message, "hi");
        // One counter is shared by both participants; sending never bumps it.
        assert_eq!(chat.unread_count, 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let messages = list_messages(&store, &chat_id).await.unwrap();
        let stored = messages.iter().find(|m| m.id == sent.id).unwrap();
        assert_eq!(stored.status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn delivery_never_downgrades_a_read_message() {
        let (store, services) = services();
        let chat_id = paired(&services).await;
        let sent = services
            .sessions
            .send_message(&chat_id, "alice", Some("hi".into()), None)
            .await
            .unwrap();

        let read = services.sessions.mark_read(&chat_id, "bob").await.unwrap();
        assert_eq!(read, 1);
        assert_eq!(get_chat(&store, &chat_id).await.unwrap().unwrap().unread_count, 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let messages = list_messages(&store, &chat_id).await.unwrap();
        let stored = messages.iter().find(|m| m.id == sent.id).unwrap();
        assert_eq!(stored.status, MessageStatus::Read);
    }

    #[tokio::test]
    async fn attachments_are_uploaded_under_the_chat() {
        let store = MemoryStore::new();
        let blobs = Arc::new(crate::blobs::MemoryBlobStore::new());
        let services = ChatServices::new(
            Arc::new(store.clone()),
            blobs.clone(),
            Arc::new(AlwaysReachable),
            crate::services::testing::fast_settings(),
        );
        let chat_id = paired(&services).await;

        let upload = Upload {
            file_name: "cat.png".into(),
            content_type: "image/png".into(),
            bytes: vec![1, 2, 3],
        };
        let sent = services
            .sessions
            .send_message(&chat_id, "bob", None, Some(upload))
            .await
            .unwrap();

        let attachment = sent.attachment.unwrap();
        assert_eq!(attachment.kind, AttachmentKind::Image);
        let prefix = format!("memory://chat-attachments/{}/", chat_id);
        assert!(attachment.url.starts_with(&prefix));
        assert!(attachment.url.ends_with("_cat.png"));
        assert_eq!(blobs.len(), 1);
        let chat = get_chat(&store, &chat_id).await.unwrap().unwrap();
        assert_eq!(chat.last_message, "Image");
    }

    #[tokio::test]
    async fn messages_require_an_active_chat_and_membership() {
        let (_store, services) = services();
        let chat_id = paired(&services).await;

        let outsider = services
            .sessions
            .send_message(&chat_id, "mallory", Some("hey".into()), None)
            .await;
        assert!(matches!(outsider, Err(ChatError::NotParticipant)));

        services.sessions.end_chat(&chat_id, "alice").await.unwrap();
        let ended = services
            .sessions
            .send_message(&chat_id, "bob", Some("still there?".into()), None)
            .await;
        assert!(matches!(ended, Err(ChatError::ChatEnded)));
    }

    #[tokio::test]
    async fn offline_users_cannot_send() {
        let store = MemoryStore::new();
        let presence = Arc::new(OfflineUsers::default());
        let services = ChatServices::new(
            Arc::new(store.clone()),
            Arc::new(crate::blobs::MemoryBlobStore::new()),
            presence.clone(),
            crate::services::testing::fast_settings(),
        );
        let chat_id = paired(&services).await;
        presence.0.insert("alice".to_string());

        let result = services
            .sessions
            .send_message(&chat_id, "alice", Some("hi".into()), None)
            .await;
        assert!(matches!(result, Err(ChatError::Offline)));
    }

    #[tokio::test]
    async fn purge_removes_ended_chats_with_their_messages() {
        let (store, services) = services();
        let chat_id = paired(&services).await;
        services
            .sessions
            .send_message(&chat_id, "alice", Some("bye".into()), None)
            .await
            .unwrap();
        services.sessions.end_chat(&chat_id, "alice").await.unwrap();

        let purged = services.sessions.purge_ended("bob").await.unwrap();
        assert_eq!(purged, 1);
        assert!(get_chat(&store, &chat_id).await.unwrap().is_none());
        assert!(list_messages(&store, &chat_id).await.unwrap().is_empty());
        assert_eq!(services.sessions.purge_ended("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sweeper_waits_one_interval_before_purging() {
        let store = MemoryStore::new();
        let services = ChatServices::new(
            Arc::new(store.clone()),
            Arc::new(crate::blobs::MemoryBlobStore::new()),
            Arc::new(AlwaysReachable),
            ChatSettings {
                sweep_interval: Duration::from_millis(300),
                ..crate::services::testing::fast_settings()
            },
        );
        let chat_id = paired(&services).await;
        services.sessions.end_chat(&chat_id, "alice").await.unwrap();

        let sweeper = services.sessions.spawn_sweeper("bob");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(get_chat(&store, &chat_id).await.unwrap().is_some());

        let purged = tokio::time::timeout(Duration::from_secs(3), async {
            while get_chat(&store, &chat_id).await.unwrap().is_some() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        sweeper.abort();
        assert!(purged.is_ok());
    }

    #[tokio::test]
    async fn purge_leaves_active_chats_alone() {
        let (store, services) = services();
        let chat_id = paired(&services).await;

        assert_eq!(services.sessions.purge_ended("alice").await.unwrap(), 0);
        assert!(get_chat(&store, &chat_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn single_chat_is_auto_activated() {
        let (_store, services) = services();
        let chat_id = paired(&services).await;
        // alice was waiting when the match happened, so nothing selected it.
        assert_eq!(services.active.get("alice"), None);

        let chats = services.sessions.active_chats("alice").await.unwrap();
        let active = services.sessions.reconcile_active("alice", &chats);
        assert_eq!(active.as_deref(), Some(chat_id.as_str()));
    }

    #[tokio::test]
    async fn chat_list_feed_follows_lifecycle() {
        let (_store, services) = services();
        let mut feed = services.sessions.watch_chat_list("alice");
        assert!(feed.next().await.unwrap().unwrap().is_empty());

        let chat_id = paired(&services).await;
        let mut latest = Vec::new();
        while latest.is_empty() {
            latest = feed.next().await.unwrap().unwrap();
        }
        assert_eq!(latest[0].id, chat_id);

        services.sessions.end_chat(&chat_id, "bob").await.unwrap();
        while !latest.is_empty() {
            latest = feed.next().await.unwrap().unwrap();
        }
    }
}
