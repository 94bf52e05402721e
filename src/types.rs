//! Basic type definitions for the chat server
//!
//! - `ConnectionId`: UUID-based opaque connection identifier
//! - `Opcode`: the request operation table

use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Identifies a live connection independently of the socket object,
/// so sessions and the presence registry can key on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request operation codes carried in the frame opcode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    ListAccounts = 0,
    CreateAccount = 1,
    Login = 2,
    Logout = 3,
    DeleteAccount = 4,
    SendMessage = 5,
    DeliverUndelivered = 6,
}

impl Opcode {
    /// Map a raw opcode byte to a known operation
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ListAccounts),
            1 => Some(Self::CreateAccount),
            2 => Some(Self::Login),
            3 => Some(Self::Logout),
            4 => Some(Self::DeleteAccount),
            5 => Some(Self::SendMessage),
            6 => Some(Self::DeliverUndelivered),
            _ => None,
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_opcode_table() {
        for raw in 0u8..=6 {
            let op = Opcode::from_u8(raw).unwrap();
            assert_eq!(u8::from(op), raw);
        }
        assert!(Opcode::from_u8(7).is_none());
        assert!(Opcode::from_u8(255).is_none());
    }
}
