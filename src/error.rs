//! Error types for the chat server
//!
//! All defined with thiserror:
//! - `FrameError`: a byte stream that does not hold a well-formed frame
//! - `ChatError`: business-rule rejections, turned into replies for the caller
//! - `AppError`: fatal connection-level failures
//! - `SendError`: a reply could not be queued for a connection

use thiserror::Error;

/// Malformed frame errors
///
/// Every variant is connection-fatal: the handler closes the socket.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Fewer bytes than the header (or the declared payload) requires
    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// Buffer holds more bytes than the header declares
    #[error("frame length mismatch: header declares {declared} payload bytes, buffer holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Declared payload exceeds the configured limit
    #[error("frame payload of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },

    /// Payload is not valid UTF-8
    #[error("frame payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// IO error from the underlying stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Business-rule errors
///
/// Local to one operation. The router converts them into an error reply
/// for the requesting connection; state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// List pattern failed to compile
    #[error("\"{0}\" is not a valid regex pattern.")]
    InvalidPattern(String),

    /// Username contains whitespace or '|'
    #[error("Failed to create account. Username cannot contain whitespace or \"|\".")]
    UsernameFormat,

    /// Username is empty
    #[error("Failed to create account. Username cannot be empty.")]
    EmptyUsername,

    /// Username already registered
    #[error("Failed to create account. Username \"{0}\" is already in use.")]
    AlreadyExists(String),

    /// No account with that username
    #[error("Account \"{0}\" not found.")]
    NotFound(String),

    /// Account is bound to another connection
    #[error("Failed to login. Account \"{0}\" is already logged in. You cannot log in to the same account from multiple clients.")]
    AlreadyOnline(String),

    /// Operation requires a bound session
    #[error("Operation not permitted. You are not logged in.")]
    NotAuthenticated,

    /// Send-message content is not `<recipient>|<body>`
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Opcode outside the defined table
    #[error("{0} is not a valid operation code.")]
    UnknownOperation(u8),
}

/// Application-level errors
///
/// Fatal for the connection that produced them.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer sent bytes that are not a valid frame (fatal)
    #[error("Malformed frame: {0}")]
    MalformedFrame(FrameError),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Remote side closed the connection
    #[error("Connection closed")]
    ConnectionClosed,

    /// Reply frame carried a status byte the client does not know
    #[error("Unknown reply status: {0}")]
    UnknownReplyStatus(u8),
}

/// IO failures surfacing through the codec stay IO errors
impl From<FrameError> for AppError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => AppError::Io(e),
            other => AppError::MalformedFrame(other),
        }
    }
}

/// Outbound reply errors
///
/// Occurs when handing a reply to a connection's writer task.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The connection is not draining its replies
    #[error("Outbound buffer full")]
    Backpressure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_messages_name_the_subject() {
        assert_eq!(
            ChatError::NotFound("bob".to_string()).to_string(),
            "Account \"bob\" not found."
        );
        assert_eq!(
            ChatError::UnknownOperation(42).to_string(),
            "42 is not a valid operation code."
        );
    }

    #[test]
    fn test_frame_error_converts_to_app_error() {
        let err: AppError = FrameError::TooLarge { len: 10, max: 5 }.into();
        assert!(matches!(err, AppError::MalformedFrame(FrameError::TooLarge { .. })));

        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: AppError = FrameError::Io(io).into();
        assert!(matches!(err, AppError::Io(_)));
    }
}
