// Credential and identity holder shared by the gateway and the coordinator
//
// This is the leaf of the dependency graph: the gateway reads the credential
// from here on every call and clears it on 401, the coordinator writes it on
// login. Neither needs a reference to the other to do so.

use super::storage::{KeyValueStore, ACCESS_TOKEN_KEY, USER_KEY};
use crate::models::User;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Inner {
    credential: String,
    identity: Option<User>,
}

/// Which durable scope a credential lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScope {
    Persistent,
    Session,
}

pub struct SessionState {
    inner: RwLock<Inner>,
    persistent: Arc<dyn KeyValueStore>,
    scoped: Arc<dyn KeyValueStore>,
}

impl SessionState {
    pub fn new(persistent: Arc<dyn KeyValueStore>, scoped: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            persistent,
            scoped,
        }
    }

    /// Current bearer token, empty when logged out
    pub fn credential(&self) -> String {
        self.read(|inner| inner.credential.clone())
    }

    pub fn identity(&self) -> Option<User> {
        self.read(|inner| inner.identity.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read(|inner| !inner.credential.is_empty())
    }

    /// Install a fresh credential and mirror it to exactly one durable scope
    pub fn establish(&self, token: &str, identity: Option<User>, scope: StorageScope) {
        let (target, other) = self.scopes(scope);

        // The other scope may hold a credential from an earlier login
        clear_store(other.as_ref());

        if let Err(e) = target.set(ACCESS_TOKEN_KEY, token) {
            tracing::warn!(store = target.label(), "Failed to persist credential: {:#}", e);
        }
        match identity.as_ref().map(serde_json::to_string) {
            Some(Ok(json)) => {
                if let Err(e) = target.set(USER_KEY, &json) {
                    tracing::warn!(store = target.label(), "Failed to persist identity: {:#}", e);
                }
            }
            Some(Err(e)) => tracing::warn!("Failed to serialize identity: {}", e),
            None => {
                let _ = target.remove(USER_KEY);
            }
        }

        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        inner.credential = token.to_string();
        inner.identity = identity;
    }

    /// Replace the identity, keeping whichever scope holds the credential in sync
    pub fn set_identity(&self, identity: User) {
        if !self.is_authenticated() {
            tracing::debug!("Ignoring identity refresh without a credential");
            return;
        }

        if let Some(store) = self.live_store() {
            match serde_json::to_string(&identity) {
                Ok(json) => {
                    if let Err(e) = store.set(USER_KEY, &json) {
                        tracing::warn!(store = store.label(), "Failed to persist identity: {:#}", e);
                    }
                }
                Err(e) => tracing::warn!("Failed to serialize identity: {}", e),
            }
        }

        self.inner
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .identity = Some(identity);
    }

    /// Drop credential and identity from memory and from both scopes.
    /// Returns whether a credential was held.
    pub fn clear(&self) -> bool {
        let was_authenticated = {
            let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
            let had = !inner.credential.is_empty();
            inner.credential.clear();
            inner.identity = None;
            had
        };

        clear_store(self.persistent.as_ref());
        clear_store(self.scoped.as_ref());

        was_authenticated
    }

    /// Load the credential from durable storage, persistent scope first.
    /// No network validation: a stale token surfaces on the first 401.
    pub fn restore(&self) -> Option<StorageScope> {
        let found = [StorageScope::Persistent, StorageScope::Session]
            .into_iter()
            .find_map(|scope| {
                let store = self.store_for(scope);
                let token = store.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())?;
                let identity = store.get(USER_KEY).and_then(|json| {
                    serde_json::from_str::<User>(&json)
                        .map_err(|e| {
                            tracing::warn!(store = store.label(), "Stored identity unreadable: {}", e)
                        })
                        .ok()
                });
                Some((scope, token, identity))
            });

        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        match found {
            Some((scope, token, identity)) => {
                inner.credential = token;
                inner.identity = identity;
                Some(scope)
            }
            None => {
                inner.credential.clear();
                inner.identity = None;
                None
            }
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        f(&self.inner.read().unwrap_or_else(|p| p.into_inner()))
    }

    fn store_for(&self, scope: StorageScope) -> &Arc<dyn KeyValueStore> {
        match scope {
            StorageScope::Persistent => &self.persistent,
            StorageScope::Session => &self.scoped,
        }
    }

    fn scopes(&self, scope: StorageScope) -> (&Arc<dyn KeyValueStore>, &Arc<dyn KeyValueStore>) {
        match scope {
            StorageScope::Persistent => (&self.persistent, &self.scoped),
            StorageScope::Session => (&self.scoped, &self.persistent),
        }
    }

    /// Scope currently holding a token, if any
    fn live_store(&self) -> Option<&Arc<dyn KeyValueStore>> {
        [&self.persistent, &self.scoped]
            .into_iter()
            .find(|s| s.get(ACCESS_TOKEN_KEY).is_some_and(|t| !t.is_empty()))
    }
}

fn clear_store(store: &dyn KeyValueStore) {
    for key in [ACCESS_TOKEN_KEY, USER_KEY] {
        if let Err(e) = store.remove(key) {
            tracing::warn!(store = store.label(), key, "Failed to clear slot: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::storage::MemoryStore;

    fn user() -> User {
        serde_json::from_value(serde_json::json!({"id": 1, "email": "a@b.c"})).unwrap()
    }

    fn state() -> (SessionState, MemoryStore, MemoryStore) {
        let persistent = MemoryStore::new("persistent");
        let scoped = MemoryStore::new("session");
        let state = SessionState::new(Arc::new(persistent.clone()), Arc::new(scoped.clone()));
        (state, persistent, scoped)
    }

    #[test]
    fn test_establish_writes_only_chosen_scope() {
        let (state, persistent, scoped) = state();
        scoped.set(ACCESS_TOKEN_KEY, "old").unwrap();

        state.establish("abc", Some(user()), StorageScope::Persistent);

        assert!(state.is_authenticated());
        assert_eq!(persistent.get(ACCESS_TOKEN_KEY).as_deref(), Some("abc"));
        assert!(scoped.is_empty());
    }

    #[test]
    fn test_clear_reports_previous_state() {
        let (state, persistent, _) = state();
        state.establish("abc", None, StorageScope::Persistent);

        assert!(state.clear());
        assert!(!state.clear());
        assert!(state.identity().is_none());
        assert!(persistent.is_empty());
    }

    #[test]
    fn test_restore_prefers_persistent_scope() {
        let (state, persistent, scoped) = state();
        persistent.set(ACCESS_TOKEN_KEY, "long-lived").unwrap();
        scoped.set(ACCESS_TOKEN_KEY, "tab").unwrap();

        assert_eq!(state.restore(), Some(StorageScope::Persistent));
        assert_eq!(state.credential(), "long-lived");
    }

    #[test]
    fn test_restore_ignores_empty_token() {
        let (state, persistent, _) = state();
        persistent.set(ACCESS_TOKEN_KEY, "").unwrap();

        assert_eq!(state.restore(), None);
        assert!(!state.is_authenticated());
    }

    #[test]
    fn test_set_identity_requires_credential() {
        let (state, _, _) = state();
        state.set_identity(user());
        assert!(state.identity().is_none());
    }
}
