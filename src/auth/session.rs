//! In-memory session key store (C11): UUID-style random keys mapped to a
//! `userId`, with collision-retry on allocation.

use std::collections::HashMap;

use parking_lot::Mutex;

pub struct SessionStore {
    sessions: Mutex<HashMap<String, String>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn alloc(&self, user_id: impl Into<String>) -> String {
        self.alloc_with(user_id, || uuid::Uuid::new_v4().to_string())
    }

    fn alloc_with(&self, user_id: impl Into<String>, mut generate: impl FnMut() -> String) -> String {
        let user_id = user_id.into();
        let mut sessions = self.sessions.lock();
        loop {
            let key = generate();
            if let std::collections::hash_map::Entry::Vacant(entry) = sessions.entry(key.clone()) {
                entry.insert(user_id);
                return key;
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.sessions.lock().get(key).cloned()
    }

    pub fn revoke(&self, key: &str) {
        self.sessions.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_get_round_trips() {
        let store = SessionStore::new();
        let key = store.alloc("user-1");
        assert_eq!(store.get(&key), Some("user-1".to_string()));
    }

    #[test]
    fn revoke_removes_the_session() {
        let store = SessionStore::new();
        let key = store.alloc("user-1");
        store.revoke(&key);
        assert_eq!(store.get(&key), None);
    }

    #[test]
    fn retries_generation_on_key_collision() {
        let store = SessionStore::new();
        store.sessions.lock().insert("dup".to_string(), "someone-else".to_string());

        let mut candidates = vec!["unique".to_string(), "dup".to_string(), "dup".to_string()];
        let key = store.alloc_with("user-1", move || candidates.pop().unwrap());

        assert_eq!(key, "unique");
        assert_eq!(store.get("unique"), Some("user-1".to_string()));
        assert_eq!(store.get("dup"), Some("someone-else".to_string()));
    }
}
