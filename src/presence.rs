//! Presence registry
//!
//! Maps each online username to the one connection authenticated as it.

use std::collections::HashMap;

use crate::types::ConnectionId;

/// Online usernames: username -> ConnectionId
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    online: HashMap<String, ConnectionId>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.online.contains_key(username)
    }

    /// Connection currently bound to `username`
    pub fn connection_of(&self, username: &str) -> Option<ConnectionId> {
        self.online.get(username).copied()
    }

    /// Mark `username` online at `connection`
    ///
    /// Returns false without changing anything if the name is already bound.
    pub fn bind(&mut self, username: &str, connection: ConnectionId) -> bool {
        if self.online.contains_key(username) {
            return false;
        }
        self.online.insert(username.to_string(), connection);
        true
    }

    /// Release `username` if it is bound to `connection`
    ///
    /// A binding held by another connection is left alone.
    pub fn release(&mut self, username: &str, connection: ConnectionId) -> bool {
        if self.online.get(username) == Some(&connection) {
            self.online.remove(username);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_is_exclusive() {
        let mut presence = PresenceRegistry::new();
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        assert!(presence.bind("alice", first));
        assert!(!presence.bind("alice", second));
        assert_eq!(presence.connection_of("alice"), Some(first));
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn test_release_only_by_owner() {
        let mut presence = PresenceRegistry::new();
        let owner = ConnectionId::new();
        let other = ConnectionId::new();
        presence.bind("alice", owner);

        assert!(!presence.release("alice", other));
        assert!(presence.is_online("alice"));

        assert!(presence.release("alice", owner));
        assert!(!presence.is_online("alice"));
        assert!(!presence.release("alice", owner));
        assert!(presence.is_empty());
    }
}
