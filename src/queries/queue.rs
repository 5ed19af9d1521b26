use crate::store::{CollectionPath, Direction, DocPath, Query};

use super::CHAT_QUEUE;

pub fn queue_collection() -> CollectionPath {
    CollectionPath::new(CHAT_QUEUE)
}

/// Queue entries are keyed by user id, so a user can be queued at most once.
pub fn queue_entry_path(user_id: &str) -> DocPath {
    queue_collection().doc(user_id)
}

/// Oldest waiting users other than the caller.
pub fn candidates_query(user_id: &str, window: usize) -> Query {
    Query::new(queue_collection())
        .where_ne("userId", user_id)
        .order_by("enqueuedAt", Direction::Asc)
        .limit(window)
}
