use crate::models::users::UserProfile;
use crate::store::{encode, CollectionPath, DocPath, Store, StoreResult, Transaction};

use super::USERS;

pub fn user_path(user_id: &str) -> DocPath {
    CollectionPath::new(USERS).doc(user_id)
}

pub async fn upsert_user(store: &dyn Store, profile: &UserProfile) -> StoreResult<()> {
    store.set(&user_path(&profile.id), encode(profile)?).await
}

pub async fn get_user(store: &dyn Store, user_id: &str) -> StoreResult<Option<UserProfile>> {
    store
        .get(&user_path(user_id))
        .await?
        .map(|doc| doc.decode())
        .transpose()
}

/// Stored nickname for `user_id`, if the profile exists and carries one.
pub async fn stored_nickname(store: &dyn Store, user_id: &str) -> StoreResult<Option<String>> {
    Ok(get_user(store, user_id)
        .await?
        .and_then(|p| p.nickname)
        .filter(|n| !n.trim().is_empty()))
}

pub async fn stored_nickname_tx(
    tx: &mut dyn Transaction,
    user_id: &str,
) -> StoreResult<Option<String>> {
    let profile: Option<UserProfile> = tx
        .get(&user_path(user_id))
        .await?
        .map(|doc| doc.decode())
        .transpose()?;
    Ok(profile
        .and_then(|p| p.nickname)
        .filter(|n| !n.trim().is_empty()))
}
