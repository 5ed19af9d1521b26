use crate::models::chats::{Chat, Message};
use crate::store::{
    CollectionPath, Direction, DocPath, Document, Query, Store, StoreResult, Transaction,
};

use super::{CHATS, MESSAGES};

pub fn chats_collection() -> CollectionPath {
    CollectionPath::new(CHATS)
}

pub fn chat_path(chat_id: &str) -> DocPath {
    chats_collection().doc(chat_id)
}

pub fn messages_collection(chat_id: &str) -> CollectionPath {
    chat_path(chat_id).child(MESSAGES)
}

pub fn message_path(chat_id: &str, message_id: &str) -> DocPath {
    messages_collection(chat_id).doc(message_id)
}

pub async fn get_chat(store: &dyn Store, chat_id: &str) -> StoreResult<Option<Chat>> {
    store
        .get(&chat_path(chat_id))
        .await?
        .map(|doc| doc.decode())
        .transpose()
}

pub async fn get_chat_tx(tx: &mut dyn Transaction, chat_id: &str) -> StoreResult<Option<Chat>> {
    tx.get(&chat_path(chat_id))
        .await?
        .map(|doc| doc.decode())
        .transpose()
}

/// Chats the user takes part in that are still active.
pub fn active_chats_query(user_id: &str) -> Query {
    Query::new(chats_collection())
        .array_contains("participants", user_id)
        .where_eq("online", true)
}

/// Ended chats waiting for the purge sweep.
pub fn ended_chats_query(user_id: &str) -> Query {
    Query::new(chats_collection())
        .array_contains("participants", user_id)
        .where_eq("online", false)
}

pub fn messages_query(chat_id: &str) -> Query {
    Query::new(messages_collection(chat_id)).order_by("timestamp", Direction::Asc)
}

pub fn latest_message_from_query(chat_id: &str, sender_id: &str) -> Query {
    Query::new(messages_collection(chat_id))
        .where_eq("senderId", sender_id)
        .order_by("timestamp", Direction::Desc)
        .limit(1)
}

/// Messages somebody other than `user_id` wrote, including system messages.
pub fn messages_not_from_query(chat_id: &str, user_id: &str) -> Query {
    Query::new(messages_collection(chat_id)).where_ne("senderId", user_id)
}

pub fn decode_chats(docs: &[Document]) -> StoreResult<Vec<Chat>> {
    docs.iter().map(Document::decode).collect()
}

pub fn decode_messages(docs: &[Document]) -> StoreResult<Vec<Message>> {
    docs.iter().map(Document::decode).collect()
}

pub async fn list_messages(store: &dyn Store, chat_id: &str) -> StoreResult<Vec<Message>> {
    let docs = store.query(&messages_query(chat_id)).await?;
    decode_messages(&docs)
}

pub async fn list_active_chats(store: &dyn Store, user_id: &str) -> StoreResult<Vec<Chat>> {
    let docs = store.query(&active_chats_query(user_id)).await?;
    decode_chats(&docs)
}
