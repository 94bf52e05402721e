//! Message protocol definitions
//!
//! Maps wire frames to typed requests and replies. Requests are an exhaustive
//! enum over the operation table; anything else decodes to
//! [`Request::Unknown`] so the router can reject it in one place.

use crate::codec::Frame;
use crate::error::ChatError;
use crate::types::Opcode;

/// Prefix for every server-originated reply text
pub const SERVER_TAG: &str = "<server>";

/// Client → Server request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// List usernames matching a regex (empty matches all)
    ListAccounts { pattern: String },
    /// Register a new account and log into it
    CreateAccount { username: String },
    /// Log into an existing account
    Login { username: String },
    /// Log out of the current account
    Logout,
    /// Delete the current account
    DeleteAccount,
    /// Send `<recipient>|<body>`
    SendMessage { content: String },
    /// Drain the current account's mailbox
    DeliverUndelivered,
    /// Opcode outside the table
    Unknown(u8),
}

impl Request {
    /// Build a request from a decoded frame
    pub fn from_frame(frame: Frame) -> Self {
        let Frame { opcode, payload } = frame;
        match Opcode::from_u8(opcode) {
            Some(Opcode::ListAccounts) => Request::ListAccounts { pattern: payload },
            Some(Opcode::CreateAccount) => Request::CreateAccount { username: payload },
            Some(Opcode::Login) => Request::Login { username: payload },
            Some(Opcode::Logout) => Request::Logout,
            Some(Opcode::DeleteAccount) => Request::DeleteAccount,
            Some(Opcode::SendMessage) => Request::SendMessage { content: payload },
            Some(Opcode::DeliverUndelivered) => Request::DeliverUndelivered,
            None => Request::Unknown(opcode),
        }
    }

    /// Encode this request as a frame (client side)
    pub fn into_frame(self) -> Frame {
        match self {
            Request::ListAccounts { pattern } => Frame::new(Opcode::ListAccounts.into(), pattern),
            Request::CreateAccount { username } => {
                Frame::new(Opcode::CreateAccount.into(), username)
            }
            Request::Login { username } => Frame::new(Opcode::Login.into(), username),
            Request::Logout => Frame::new(Opcode::Logout.into(), ""),
            Request::DeleteAccount => Frame::new(Opcode::DeleteAccount.into(), ""),
            Request::SendMessage { content } => Frame::new(Opcode::SendMessage.into(), content),
            Request::DeliverUndelivered => Frame::new(Opcode::DeliverUndelivered.into(), ""),
            Request::Unknown(opcode) => Frame::new(opcode, ""),
        }
    }

    /// Whether the operation needs a logged-in session
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Request::Logout
                | Request::DeleteAccount
                | Request::SendMessage { .. }
                | Request::DeliverUndelivered
        )
    }
}

/// Split send-message content into `(recipient, body)`
///
/// The first `|` separates the two parts. The recipient must be non-empty
/// without whitespace; the body must be non-empty.
pub fn parse_direct_message(content: &str) -> Result<(&str, &str), ChatError> {
    let invalid = || ChatError::InvalidInput(content.to_string());

    let (recipient, body) = content.split_once('|').ok_or_else(invalid)?;
    if recipient.is_empty() || recipient.chars().any(char::is_whitespace) || body.is_empty() {
        return Err(invalid());
    }
    Ok((recipient, body))
}

/// Reply status carried in the reply frame's opcode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyKind {
    /// Server confirmation or informational notice
    Notice = 0,
    /// Rejected operation
    Error = 1,
    /// Chat message from another account
    Message = 2,
}

impl ReplyKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Notice),
            1 => Some(Self::Error),
            2 => Some(Self::Message),
            _ => None,
        }
    }
}

/// Server → Client reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub text: String,
}

impl Reply {
    /// Server notice, tagged with [`SERVER_TAG`]
    pub fn notice(text: impl std::fmt::Display) -> Self {
        Self {
            kind: ReplyKind::Notice,
            text: format!("{SERVER_TAG} {text}"),
        }
    }

    /// Chat message, already formatted as `<sender> body`
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Message,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ReplyKind::Error
    }

    pub fn into_frame(self) -> Frame {
        Frame::new(self.kind as u8, self.text)
    }

    /// Parse a reply frame; `None` if the status byte is unknown
    pub fn from_frame(frame: Frame) -> Option<Self> {
        let kind = ReplyKind::from_u8(frame.opcode)?;
        Some(Self {
            kind,
            text: frame.payload,
        })
    }
}

/// Convert ChatError to an error Reply for the caller
impl From<ChatError> for Reply {
    fn from(err: ChatError) -> Self {
        Self {
            kind: ReplyKind::Error,
            text: format!("{SERVER_TAG} {err}"),
        }
    }
}
