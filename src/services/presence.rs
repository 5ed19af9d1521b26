use crate::error::{ChatError, ChatResult};

/// Per-user reachability signal. Mutating operations are refused while the
/// caller is unreachable.
pub trait Presence: Send + Sync {
    fn is_reachable(&self, user_id: &str) -> bool;
}

/// Treats every user as reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

impl Presence for AlwaysReachable {
    fn is_reachable(&self, _user_id: &str) -> bool {
        true
    }
}

pub(crate) fn ensure_reachable(presence: &dyn Presence, user_id: &str) -> ChatResult<()> {
    if presence.is_reachable(user_id) {
        Ok(())
    } else {
        tracing::debug!(user_id, "Refusing action from unreachable user");
        Err(ChatError::Offline)
    }
}
