//! Friend requests: NONE to PENDING, then ACCEPTED or deleted.
//!
//! Requests are keyed by direction (`sender_receiver`), friendships by the
//! sorted pair. A friendship document is authoritative on its own.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{ChatError, ChatResult};
use crate::models::chats::{Message, SystemEvent};
use crate::models::friends::{
    FriendRequest, FriendStatus, FriendStatusView, Friendship, IncomingRequest, RequestStatus,
};
use crate::models::users::ANONYMOUS_NICKNAME;
use crate::queries::chats::{get_chat, get_chat_tx, messages_collection};
use crate::queries::friends::{
    friend_requests_collection, friends_collection, friendship_path, get_friendship, get_request,
    get_request_tx, incoming_requests_query, request_id, request_path,
};
use crate::queries::users::{stored_nickname, stored_nickname_tx};
use crate::store::{encode, watch, with_retries, Store, StoreResult, Subscription};

use super::display_nickname;
use super::presence::{ensure_reachable, Presence};
use super::ChatSettings;

/// Result of a reject call. Only `Removed` changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectOutcome {
    Removed,
    NotFound,
    AlreadyActioned,
}

#[derive(Clone)]
pub struct FriendRequests {
    store: Arc<dyn Store>,
    presence: Arc<dyn Presence>,
    settings: ChatSettings,
}

impl FriendRequests {
    pub fn new(store: Arc<dyn Store>, presence: Arc<dyn Presence>, settings: ChatSettings) -> Self {
        Self {
            store,
            presence,
            settings,
        }
    }

    /// Ask the other participant of `chat_id` to become friends. A pending
    /// request in the same direction is overwritten.
    pub async fn send_request(
        &self,
        chat_id: &str,
        sender_id: &str,
        nickname: &str,
    ) -> ChatResult<FriendRequest> {
        if chat_id.is_empty() || sender_id.is_empty() {
            return Err(ChatError::Declined("friend request without chat or sender"));
        }
        ensure_reachable(self.presence.as_ref(), sender_id)?;

        let request = with_retries(self.settings.max_tx_attempts, move || {
            self.try_send(chat_id, sender_id, nickname)
        })
        .await??;
        tracing::info!(chat_id, request_id = %request.id, "Friend request sent");
        Ok(request)
    }

    async fn try_send(
        &self,
        chat_id: &str,
        sender_id: &str,
        nickname: &str,
    ) -> StoreResult<ChatResult<FriendRequest>> {
        let mut tx = self.store.begin().await?;
        let Some(chat) = get_chat_tx(&mut *tx, chat_id).await? else {
            return Ok(Err(ChatError::ChatNotFound));
        };
        let Some(receiver_id) = chat.partner_of(sender_id).map(str::to_string) else {
            return Ok(Err(ChatError::NotParticipant));
        };
        let sender_nickname = stored_nickname_tx(&mut *tx, sender_id)
            .await?
            .unwrap_or_else(|| display_nickname(nickname));

        let now = self.store.server_timestamp();
        let id = request_id(sender_id, &receiver_id);
        let request = FriendRequest {
            id: id.clone(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.clone(),
            status: RequestStatus::Pending,
            timestamp: now,
            chat_id: chat_id.to_string(),
        };
        let announcement = Message::system(
            None,
            Some(SystemEvent::FriendRequestSent {
                request_sender_id: sender_id.to_string(),
                request_receiver_id: receiver_id,
                sender_nickname,
            }),
            now,
        );

        tx.set(messages_collection(chat_id).new_doc(), encode(&announcement)?);
        tx.set(request_path(&id), encode(&request)?);
        tx.commit().await?;
        Ok(Ok(request))
    }

    /// Accept a pending request addressed to `user_id`. The status change,
    /// the friendship and the announcement commit together.
    pub async fn accept_request(&self, request_id: &str, user_id: &str) -> ChatResult<Friendship> {
        if request_id.is_empty() || user_id.is_empty() {
            return Err(ChatError::Declined("accept without request or user id"));
        }
        let friendship = with_retries(self.settings.max_tx_attempts, move || {
            self.try_accept(request_id, user_id)
        })
        .await??;
        tracing::info!(request_id, user_id, friendship_id = %friendship.id, "Friend request accepted");
        Ok(friendship)
    }

    async fn try_accept(
        &self,
        request_id: &str,
        user_id: &str,
    ) -> StoreResult<ChatResult<Friendship>> {
        let mut tx = self.store.begin().await?;
        let Some(request) = get_request_tx(&mut *tx, request_id).await? else {
            return Ok(Err(ChatError::RequestNotFound));
        };
        if request.receiver_id != user_id {
            return Ok(Err(ChatError::NotAddressedToYou));
        }
        if request.status != RequestStatus::Pending {
            return Ok(Err(ChatError::AlreadyActioned));
        }

        let now = self.store.server_timestamp();
        let path = friendship_path(&request.sender_id, &request.receiver_id);
        let friendship = match tx.get(&path).await? {
            Some(existing) => existing.decode::<Friendship>()?,
            None => {
                let participants: BTreeSet<&str> =
                    [request.sender_id.as_str(), request.receiver_id.as_str()].into();
                let friendship = Friendship {
                    id: path.id().to_string(),
                    participants: participants.into_iter().map(str::to_string).collect(),
                    created_at: now,
                };
                tx.set(path.clone(), encode(&friendship)?);
                friendship
            }
        };

        tx.update(
            request_path(request_id),
            serde_json::json!({ "status": RequestStatus::Accepted }),
        );
        if get_chat_tx(&mut *tx, &request.chat_id).await?.is_some() {
            let announcement = Message::system(
                None,
                Some(SystemEvent::FriendRequestAccepted {
                    request_sender_id: request.sender_id.clone(),
                    request_receiver_id: request.receiver_id.clone(),
                }),
                now,
            );
            tx.set(
                messages_collection(&request.chat_id).new_doc(),
                encode(&announcement)?,
            );
        }
        tx.commit().await?;
        Ok(Ok(friendship))
    }

    /// Withdraw or decline a pending request. Acting on a missing or
    /// already accepted request is a benign no-op.
    pub async fn reject_request(&self, request_id: &str, user_id: &str) -> ChatResult<RejectOutcome> {
        if request_id.is_empty() || user_id.is_empty() {
            return Err(ChatError::Declined("reject without request or user id"));
        }
        let outcome = with_retries(self.settings.max_tx_attempts, move || {
            self.try_reject(request_id, user_id)
        })
        .await??;
        tracing::info!(request_id, user_id, ?outcome, "Friend request rejected");
        Ok(outcome)
    }

    async fn try_reject(
        &self,
        request_id: &str,
        user_id: &str,
    ) -> StoreResult<ChatResult<RejectOutcome>> {
        let mut tx = self.store.begin().await?;
        let Some(request) = get_request_tx(&mut *tx, request_id).await? else {
            return Ok(Ok(RejectOutcome::NotFound));
        };
        if !request.involves(user_id) {
            return Ok(Err(ChatError::NotInvolved));
        }
        if request.status != RequestStatus::Pending {
            return Ok(Ok(RejectOutcome::AlreadyActioned));
        }
        tx.delete(request_path(request_id));
        tx.commit().await?;
        Ok(Ok(RejectOutcome::Removed))
    }

    /// Friend status of `partner_id` as seen by `viewer_id`.
    pub async fn status(&self, viewer_id: &str, partner_id: &str) -> ChatResult<FriendStatusView> {
        Ok(friend_status(self.store.as_ref(), viewer_id, partner_id).await?)
    }

    /// Friend status of the viewer's partner in `chat_id`.
    pub async fn status_in_chat(&self, chat_id: &str, viewer_id: &str) -> ChatResult<FriendStatusView> {
        let chat = get_chat(self.store.as_ref(), chat_id)
            .await?
            .ok_or(ChatError::ChatNotFound)?;
        let partner = chat.partner_of(viewer_id).ok_or(ChatError::NotParticipant)?;
        self.status(viewer_id, partner).await
    }

    pub async fn are_friends(&self, a: &str, b: &str) -> ChatResult<bool> {
        Ok(get_friendship(self.store.as_ref(), a, b).await?.is_some())
    }

    /// Pending requests addressed to `user_id`, newest first.
    pub async fn incoming_requests(&self, user_id: &str) -> ChatResult<Vec<IncomingRequest>> {
        Ok(load_incoming(self.store.as_ref(), user_id).await?)
    }

    pub fn watch_status(&self, viewer_id: &str, partner_id: &str) -> Subscription<FriendStatusView> {
        let viewer_id = viewer_id.to_string();
        let partner_id = partner_id.to_string();
        watch(
            self.store.clone(),
            vec![friend_requests_collection(), friends_collection()],
            move |store| {
                let viewer_id = viewer_id.clone();
                let partner_id = partner_id.clone();
                async move { friend_status(store.as_ref(), &viewer_id, &partner_id).await }
            },
        )
    }

    pub fn watch_incoming(&self, user_id: &str) -> Subscription<Vec<IncomingRequest>> {
        let user_id = user_id.to_string();
        watch(
            self.store.clone(),
            vec![friend_requests_collection()],
            move |store| {
                let user_id = user_id.clone();
                async move { load_incoming(store.as_ref(), &user_id).await }
            },
        )
    }
}

/// Status from the pair's friendship flag and both directional requests.
/// Friendship wins, then any accepted request, then a request the viewer
/// received, then one the viewer sent.
pub fn derive_status(
    friends: bool,
    sent: Option<&FriendRequest>,
    received: Option<&FriendRequest>,
) -> FriendStatusView {
    let accepted = [sent, received]
        .into_iter()
        .flatten()
        .find(|r| r.status == RequestStatus::Accepted);
    fn pending(request: Option<&FriendRequest>) -> Option<&FriendRequest> {
        request.filter(|r| r.status == RequestStatus::Pending)
    }

    let (status, request) = if friends {
        (FriendStatus::Accepted, accepted.or(sent).or(received))
    } else if let Some(request) = accepted {
        (FriendStatus::Accepted, Some(request))
    } else if let Some(request) = pending(received) {
        (FriendStatus::Received, Some(request))
    } else if let Some(request) = pending(sent) {
        (FriendStatus::Sent, Some(request))
    } else {
        return FriendStatusView::none();
    };
    FriendStatusView {
        status,
        request_id: request.map(|r| r.id.clone()),
    }
}

pub async fn friend_status(
    store: &dyn Store,
    viewer_id: &str,
    partner_id: &str,
) -> StoreResult<FriendStatusView> {
    let friends = get_friendship(store, viewer_id, partner_id).await?.is_some();
    let sent = get_request(store, &request_id(viewer_id, partner_id)).await?;
    let received = get_request(store, &request_id(partner_id, viewer_id)).await?;
    Ok(derive_status(friends, sent.as_ref(), received.as_ref()))
}

async fn load_incoming(store: &dyn Store, user_id: &str) -> StoreResult<Vec<IncomingRequest>> {
    let docs = store.query(&incoming_requests_query(user_id)).await?;
    let mut incoming = Vec::with_capacity(docs.len());
    for doc in docs {
        let request: FriendRequest = doc.decode()?;
        let sender_nickname = match stored_nickname(store, &request.sender_id).await? {
            Some(nickname) => nickname,
            None => get_chat(store, &request.chat_id)
                .await?
                .and_then(|chat| chat.participant_nicknames.get(&request.sender_id).cloned())
                .unwrap_or_else(|| ANONYMOUS_NICKNAME.to_string()),
        };
        incoming.push(IncomingRequest {
            request,
            sender_nickname,
        });
    }
    incoming.sort_by(|a, b| b.request.timestamp.cmp(&a.request.timestamp));
    Ok(incoming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::chats::list_messages;
    use crate::services::testing::services;
    use crate::services::{ChatServices, EndOutcome, MatchOutcome};
    use chrono::Utc;
    use rstest::rstest;

    fn request(sender: &str, receiver: &str, status: RequestStatus) -> FriendRequest {
        FriendRequest {
            id: request_id(sender, receiver),
            sender_id: sender.into(),
            receiver_id: receiver.into(),
            status,
            timestamp: Utc::now(),
            chat_id: "c".into(),
        }
    }

    #[rstest]
    #[case(false, None, None, FriendStatus::None)]
    #[case(false, Some(RequestStatus::Pending), None, FriendStatus::Sent)]
    #[case(false, None, Some(RequestStatus::Pending), FriendStatus::Received)]
    #[case(false, Some(RequestStatus::Pending), Some(RequestStatus::Pending), FriendStatus::Received)]
    #[case(false, Some(RequestStatus::Accepted), Some(RequestStatus::Pending), FriendStatus::Accepted)]
    #[case(true, None, None, FriendStatus::Accepted)]
    #[case(true, Some(RequestStatus::Pending), None, FriendStatus::Accepted)]
    fn status_priority(
        #[case] friends: bool,
        #[case] sent: Option<RequestStatus>,
        #[case] received: Option<RequestStatus>,
        #[case] expected: FriendStatus,
    ) {
        let sent = sent.map(|s| request("me", "you", s));
        let received = received.map(|s| request("you", "me", s));
        let view = derive_status(friends, sent.as_ref(), received.as_ref());
        assert_eq!(view.status, expected);
    }

    async fn chat_between(services: &ChatServices) -> String {
        services.matchmaking.start_chat("alice", "Alice").await.unwrap();
        match services.matchmaking.start_chat("bob", "Bob").await.unwrap() {
            MatchOutcome::Matched { chat_id, .. } => chat_id,
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn only_the_receiver_can_accept() {
        let (_store, services) = services();
        let chat_id = chat_between(&services).await;
        let request = services
            .friends
            .send_request(&chat_id, "alice", "Alice")
            .await
            .unwrap();

        let by_sender = services.friends.accept_request(&request.id, "alice").await;
        assert!(matches!(by_sender, Err(ChatError::NotAddressedToYou)));

        let missing = services.friends.accept_request("nobody_bob", "bob").await;
        assert!(matches!(missing, Err(ChatError::RequestNotFound)));

        services.friends.accept_request(&request.id, "bob").await.unwrap();
        let twice = services.friends.accept_request(&request.id, "bob").await;
        assert!(matches!(twice, Err(ChatError::AlreadyActioned)));
    }

    #[tokio::test]
    async fn acceptance_writes_friendship_and_announcement_together() {
        let (store, services) = services();
        let chat_id = chat_between(&services).await;
        let request = services
            .friends
            .send_request(&chat_id, "bob", "Bob")
            .await
            .unwrap();

        let friendship = services.friends.accept_request(&request.id, "alice").await.unwrap();
        assert_eq!(friendship.id, "alice_bob");
        assert_eq!(friendship.participants, vec!["alice", "bob"]);
        assert!(services.friends.are_friends("bob", "alice").await.unwrap());

        let events: Vec<SystemEvent> = list_messages(&store, &chat_id)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|m| m.event)
            .collect();
        assert_eq!(
            events.last(),
            Some(&SystemEvent::FriendRequestAccepted {
                request_sender_id: "bob".into(),
                request_receiver_id: "alice".into(),
            })
        );

        let outcome = services.sessions.end_chat(&chat_id, "bob").await.unwrap();
        assert_eq!(outcome, EndOutcome::Refused);
    }

    #[tokio::test]
    async fn reject_is_a_noop_the_second_time() {
        let (_store, services) = services();
        let chat_id = chat_between(&services).await;
        let request = services
            .friends
            .send_request(&chat_id, "alice", "Alice")
            .await
            .unwrap();

        let outsider = services.friends.reject_request(&request.id, "mallory").await;
        assert!(matches!(outsider, Err(ChatError::NotInvolved)));

        let first = services.friends.reject_request(&request.id, "bob").await.unwrap();
        assert_eq!(first, RejectOutcome::Removed);
        let second = services.friends.reject_request(&request.id, "bob").await.unwrap();
        assert_eq!(second, RejectOutcome::NotFound);

        let view = services.friends.status("alice", "bob").await.unwrap();
        assert_eq!(view, FriendStatusView::none());
    }

    #[tokio::test]
    async fn incoming_requests_carry_sender_nickname() {
        let (_store, services) = services();
        let chat_id = chat_between(&services).await;
        services
            .friends
            .send_request(&chat_id, "alice", "ignored")
            .await
            .unwrap();

        let incoming = services.friends.incoming_requests("bob").await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].sender_nickname, "Alice");
        assert!(services.friends.incoming_requests("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outsiders_cannot_send_requests() {
        let (_store, services) = services();
        let chat_id = chat_between(&services).await;
        let result = services.friends.send_request(&chat_id, "mallory", "M").await;
        assert!(matches!(result, Err(ChatError::NotParticipant)));
        let missing = services.friends.send_request("nope", "alice", "A").await;
        assert!(matches!(missing, Err(ChatError::ChatNotFound)));
    }
}
