use std::sync::Arc;
use std::time::Duration;

use stranger_chat::blobs::MemoryBlobStore;
use stranger_chat::models::chats::{MessageStatus, SystemEvent};
use stranger_chat::models::friends::{FriendStatus, RequestStatus};
use stranger_chat::queries::chats::{get_chat, list_messages};
use stranger_chat::queries::friends::{get_friendship, get_request};
use stranger_chat::queries::queue::queue_entry_path;
use stranger_chat::services::{AlwaysReachable, EndOutcome, MatchOutcome};
use stranger_chat::store::{MemoryStore, Store};
use stranger_chat::{ChatError, ChatServices, ChatSettings};

const A: &str = "user-a";
const B: &str = "user-b";

fn setup(settings: ChatSettings) -> (MemoryStore, ChatServices) {
    let store = MemoryStore::new();
    let services = ChatServices::new(
        Arc::new(store.clone()),
        Arc::new(MemoryBlobStore::new()),
        Arc::new(AlwaysReachable),
        settings,
    );
    (store, services)
}

fn fast() -> ChatSettings {
    ChatSettings {
        delivery_delay: Duration::from_millis(10),
        sweep_interval: Duration::from_millis(20),
        ..ChatSettings::default()
    }
}

async fn matched_chat(services: &ChatServices) -> String {
    services.matchmaking.start_chat(A, "Ann").await.unwrap();
    match services.matchmaking.start_chat(B, "Ben").await.unwrap() {
        MatchOutcome::Matched { chat_id, .. } => chat_id,
        other => panic!("expected B to be matched, got {:?}", other),
    }
}

#[tokio::test]
async fn lone_caller_is_queued() {
    let (store, services) = setup(fast());

    let outcome = services.matchmaking.start_chat(A, "Ann").await.unwrap();

    assert_eq!(outcome, MatchOutcome::Waiting { already_queued: false });
    assert!(store.get(&queue_entry_path(A)).await.unwrap().is_some());
}

#[tokio::test]
async fn second_caller_is_paired_with_the_waiting_user() {
    let (store, services) = setup(fast());
    services.matchmaking.start_chat(A, "Ann").await.unwrap();
    let mut a_chats = services.sessions.watch_chat_list(A);
    assert!(a_chats.next().await.unwrap().unwrap().is_empty());

    let chat_id = match services.matchmaking.start_chat(B, "Ben").await.unwrap() {
        MatchOutcome::Matched { chat_id, partner_id } => {
            assert_eq!(partner_id, A);
            chat_id
        }
        other => panic!("expected a match, got {:?}", other),
    };

    assert!(store.get(&queue_entry_path(A)).await.unwrap().is_none());
    assert!(store.get(&queue_entry_path(B)).await.unwrap().is_none());

    let chat = get_chat(&store, &chat_id).await.unwrap().unwrap();
    assert!(chat.online);
    // The waiting user comes first
    assert_eq!(chat.participants, vec![A, B]);

    let messages = list_messages(&store, &chat_id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_system());
    assert_eq!(messages[0].status, MessageStatus::Read);

    // A's live chat list picks up the new chat
    let seen = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let chats = a_chats.next().await.unwrap().unwrap();
            if !chats.is_empty() {
                return chats;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(seen[0].id, chat_id);
}

#[tokio::test]
async fn friend_request_is_announced_and_pending() {
    let (store, services) = setup(fast());
    let chat_id = matched_chat(&services).await;

    let request = services.friends.send_request(&chat_id, A, "Ann").await.unwrap();
    assert_eq!(request.id, format!("{}_{}", A, B));

    let events: Vec<SystemEvent> = list_messages(&store, &chat_id)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| m.event)
        .collect();
    assert_eq!(
        events,
        vec![SystemEvent::FriendRequestSent {
            request_sender_id: A.to_string(),
            request_receiver_id: B.to_string(),
            sender_nickname: "Ann".to_string(),
        }]
    );

    let stored = get_request(&store, &request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
    assert_eq!(stored.chat_id, chat_id);

    let for_a = services.friends.status_in_chat(&chat_id, A).await.unwrap();
    let for_b = services.friends.status_in_chat(&chat_id, B).await.unwrap();
    assert_eq!(for_a.status, FriendStatus::Sent);
    assert_eq!(for_b.status, FriendStatus::Received);
    assert_eq!(for_b.request_id.as_deref(), Some(request.id.as_str()));
}

#[tokio::test]
async fn accepted_request_makes_friends_and_blocks_ending() {
    let (store, services) = setup(fast());
    let chat_id = matched_chat(&services).await;
    let request = services.friends.send_request(&chat_id, A, "Ann").await.unwrap();

    services.friends.accept_request(&request.id, B).await.unwrap();

    let stored = get_request(&store, &request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Accepted);
    let friendship = get_friendship(&store, B, A).await.unwrap().unwrap();
    assert_eq!(friendship.id, format!("{}_{}", A, B));

    let last_event = list_messages(&store, &chat_id)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| m.event)
        .last();
    assert_eq!(
        last_event,
        Some(SystemEvent::FriendRequestAccepted {
            request_sender_id: A.to_string(),
            request_receiver_id: B.to_string(),
        })
    );

    for viewer in [A, B] {
        let view = services.friends.status_in_chat(&chat_id, viewer).await.unwrap();
        assert_eq!(view.status, FriendStatus::Accepted);
    }

    let outcome = services.sessions.end_chat(&chat_id, A).await.unwrap();
    assert_eq!(outcome, EndOutcome::Refused);
    assert!(get_chat(&store, &chat_id).await.unwrap().unwrap().online);
}

#[tokio::test]
async fn ended_chat_is_swept_away() {
    let (store, services) = setup(fast());
    let chat_id = matched_chat(&services).await;
    services
        .sessions
        .send_message(&chat_id, B, Some("hello".into()), None)
        .await
        .unwrap();

    let outcome = services.sessions.end_chat(&chat_id, A).await.unwrap();
    assert_eq!(outcome, EndOutcome::Ended);

    let chat = get_chat(&store, &chat_id).await.unwrap().unwrap();
    assert!(!chat.online);
    let ended_by = list_messages(&store, &chat_id)
        .await
        .unwrap()
        .into_iter()
        .find_map(|m| match m.event {
            Some(SystemEvent::ChatEnded { ended_by }) => Some(ended_by),
            _ => None,
        });
    assert_eq!(ended_by.as_deref(), Some(A));
    assert!(services.sessions.active_chats(B).await.unwrap().is_empty());

    let sweeper = services.sessions.spawn_sweeper(B);
    let gone = tokio::time::timeout(Duration::from_secs(2), async {
        while get_chat(&store, &chat_id).await.unwrap().is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    sweeper.abort();

    assert!(gone.is_ok(), "sweeper never purged the ended chat");
    assert!(list_messages(&store, &chat_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancel_and_reject_are_benign_when_repeated() {
    let (_store, services) = setup(fast());

    services.matchmaking.start_chat(A, "Ann").await.unwrap();
    assert!(services.matchmaking.cancel_search(A).await.unwrap());
    assert!(!services.matchmaking.cancel_search(A).await.unwrap());

    let chat_id = matched_chat(&services).await;
    let request = services.friends.send_request(&chat_id, B, "Ben").await.unwrap();
    services.friends.reject_request(&request.id, A).await.unwrap();
    let again = services.friends.reject_request(&request.id, A).await;
    assert!(again.is_ok());

    let accept_rejected = services.friends.accept_request(&request.id, A).await;
    assert!(matches!(accept_rejected, Err(ChatError::RequestNotFound)));
}
