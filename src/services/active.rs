use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// Which chat each user currently has open. Observers are notified on every
/// change so they can switch their message feed.
#[derive(Debug, Clone, Default)]
pub struct ActiveChats {
    pointers: Arc<DashMap<String, watch::Sender<Option<String>>>>,
}

impl ActiveChats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<String> {
        self.pointers
            .get(user_id)
            .and_then(|pointer| pointer.borrow().clone())
    }

    pub fn set(&self, user_id: &str, chat_id: &str) {
        self.pointers
            .entry(user_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(Some(chat_id.to_string()));
    }

    pub fn clear(&self, user_id: &str) {
        if let Some(pointer) = self.pointers.get(user_id) {
            pointer.send_replace(None);
        }
    }

    /// Clear the pointer only if it still points at `chat_id`.
    pub fn clear_if(&self, user_id: &str, chat_id: &str) -> bool {
        match self.pointers.get(user_id) {
            Some(pointer) => pointer.send_if_modified(|current| {
                if current.as_deref() == Some(chat_id) {
                    *current = None;
                    true
                } else {
                    false
                }
            }),
            None => false,
        }
    }

    pub fn subscribe(&self, user_id: &str) -> watch::Receiver<Option<String>> {
        self.pointers
            .entry(user_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_pointer_changes() {
        let active = ActiveChats::new();
        let mut rx = active.subscribe("alice");
        assert_eq!(*rx.borrow(), None);

        active.set("alice", "c1");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_deref(), Some("c1"));

        assert!(!active.clear_if("alice", "other"));
        assert_eq!(active.get("alice").as_deref(), Some("c1"));

        assert!(active.clear_if("alice", "c1"));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), None);
    }

    #[test]
    fn clearing_an_unknown_user_is_a_noop() {
        let active = ActiveChats::new();
        active.clear("ghost");
        assert_eq!(active.get("ghost"), None);
    }
}
