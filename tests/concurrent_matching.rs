use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use stranger_chat::blobs::MemoryBlobStore;
use stranger_chat::models::chats::Chat;
use stranger_chat::models::users::QueueEntry;
use stranger_chat::queries::chats::chats_collection;
use stranger_chat::queries::queue::queue_collection;
use stranger_chat::services::{AlwaysReachable, MatchOutcome};
use stranger_chat::store::{MemoryStore, Query, Store};
use stranger_chat::{ChatServices, ChatSettings};

const USERS: usize = 24;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_user_ends_up_in_one_chat_or_the_queue() {
    let store = MemoryStore::new();
    let services = ChatServices::new(
        Arc::new(store.clone()),
        Arc::new(MemoryBlobStore::new()),
        Arc::new(AlwaysReachable),
        ChatSettings {
            max_tx_attempts: 200,
            delivery_delay: Duration::from_millis(10),
            ..ChatSettings::default()
        },
    );

    let handles: Vec<_> = (0..USERS)
        .map(|i| {
            let services = services.clone();
            tokio::spawn(async move {
                let user = format!("user-{}", i);
                let outcome = services.matchmaking.start_chat(&user, &user).await;
                (user, outcome)
            })
        })
        .collect();

    let mut matched_by_call = HashMap::new();
    for handle in handles {
        let (user, outcome) = handle.await.unwrap();
        if let MatchOutcome::Matched { chat_id, .. } = outcome.unwrap() {
            matched_by_call.insert(user, chat_id);
        }
    }

    let chat_docs = store.query(&Query::new(chats_collection())).await.unwrap();
    let chats: Vec<Chat> = chat_docs.iter().map(|d| d.decode().unwrap()).collect();
    let queued: HashSet<String> = store
        .query(&Query::new(queue_collection()))
        .await
        .unwrap()
        .iter()
        .map(|d| d.decode::<QueueEntry>().unwrap().user_id)
        .collect();

    let mut chat_of: HashMap<String, String> = HashMap::new();
    for chat in &chats {
        assert!(chat.online);
        assert_eq!(chat.participants.len(), 2);
        assert_ne!(chat.participants[0], chat.participants[1]);
        for participant in &chat.participants {
            let previous = chat_of.insert(participant.clone(), chat.id.clone());
            assert!(previous.is_none(), "{} was paired twice", participant);
            assert!(!queued.contains(participant), "{} is both paired and queued", participant);
        }
    }

    // Exactly one successful pairing per chat, reported to its creator
    assert_eq!(matched_by_call.len(), chats.len());
    for (user, chat_id) in &matched_by_call {
        assert_eq!(chat_of.get(user), Some(chat_id));
    }

    assert_eq!(chat_of.len() + queued.len(), USERS);
}
