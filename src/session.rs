//! Per-connection session state

use crate::types::ConnectionId;

/// Authentication state of one connection
///
/// At most one username is bound at a time. The binding is changed only by
/// the router, inside the server actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: ConnectionId,
    username: Option<String>,
}

impl Session {
    pub fn new(id: ConnectionId) -> Self {
        Self { id, username: None }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Bound username, if logged in
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

    pub(crate) fn bind(&mut self, username: String) {
        self.username = Some(username);
    }

    /// Clear the binding, returning the name that was bound
    pub(crate) fn unbind(&mut self) -> Option<String> {
        self.username.take()
    }
}
