use crate::models::friends::{FriendRequest, Friendship};
use crate::store::{CollectionPath, DocPath, Query, Store, StoreResult, Transaction};

use super::{FRIENDS, FRIEND_REQUESTS};

/// Symmetric key for a pair of users: both ids, sorted, joined with `_`.
pub fn pair_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}_{}", a, b)
    } else {
        format!("{}_{}", b, a)
    }
}

/// Directional key of a friend request: sender first.
pub fn request_id(sender_id: &str, receiver_id: &str) -> String {
    format!("{}_{}", sender_id, receiver_id)
}

pub fn friend_requests_collection() -> CollectionPath {
    CollectionPath::new(FRIEND_REQUESTS)
}

pub fn friends_collection() -> CollectionPath {
    CollectionPath::new(FRIENDS)
}

pub fn request_path(request_id: &str) -> DocPath {
    friend_requests_collection().doc(request_id)
}

pub fn friendship_path(a: &str, b: &str) -> DocPath {
    friends_collection().doc(&pair_id(a, b))
}

pub async fn get_request(store: &dyn Store, request_id: &str) -> StoreResult<Option<FriendRequest>> {
    store
        .get(&request_path(request_id))
        .await?
        .map(|doc| doc.decode())
        .transpose()
}

pub async fn get_request_tx(
    tx: &mut dyn Transaction,
    request_id: &str,
) -> StoreResult<Option<FriendRequest>> {
    tx.get(&request_path(request_id))
        .await?
        .map(|doc| doc.decode())
        .transpose()
}

pub async fn get_friendship(store: &dyn Store, a: &str, b: &str) -> StoreResult<Option<Friendship>> {
    store
        .get(&friendship_path(a, b))
        .await?
        .map(|doc| doc.decode())
        .transpose()
}

pub async fn friendship_exists_tx(tx: &mut dyn Transaction, a: &str, b: &str) -> StoreResult<bool> {
    Ok(tx.get(&friendship_path(a, b)).await?.is_some())
}

pub fn incoming_requests_query(user_id: &str) -> Query {
    Query::new(friend_requests_collection())
        .where_eq("receiverId", user_id)
        .where_eq("status", "pending")
}
