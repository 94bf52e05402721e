//! Connection record held by the server actor
//!
//! Pairs a connection's session with the channel its writer task drains and
//! the signal that tells its handler to close the socket.

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;

use crate::error::SendError;
use crate::message::Reply;
use crate::session::Session;
use crate::types::ConnectionId;

/// Replies produced by one command for one connection
///
/// A batch takes a single slot in the outbound channel however many
/// replies it carries.
pub type ReplyBatch = Vec<Reply>;

/// A batch the connection could not take, handed back to the caller
#[derive(Debug)]
pub struct Undelivered {
    pub reason: SendError,
    pub batch: ReplyBatch,
}

/// A live connection as seen by the server
#[derive(Debug)]
pub struct Connection {
    /// Authentication state
    pub session: Session,
    /// Server → connection reply channel
    sender: mpsc::Sender<ReplyBatch>,
    /// Fired when the server drops the connection
    closer: oneshot::Sender<()>,
}

impl Connection {
    /// Create a new, unauthenticated connection
    pub fn new(
        id: ConnectionId,
        sender: mpsc::Sender<ReplyBatch>,
        closer: oneshot::Sender<()>,
    ) -> Self {
        Self {
            session: Session::new(id),
            sender,
            closer,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.session.id()
    }

    /// Queue a batch of replies for this connection without waiting
    ///
    /// A full buffer is reported as `Backpressure` so the caller can drop the
    /// connection instead of stalling on it. Either way the batch comes back.
    pub fn deliver(&self, batch: ReplyBatch) -> Result<(), Undelivered> {
        self.sender.try_send(batch).map_err(|e| match e {
            TrySendError::Full(batch) => Undelivered {
                reason: SendError::Backpressure,
                batch,
            },
            TrySendError::Closed(batch) => Undelivered {
                reason: SendError::ChannelClosed,
                batch,
            },
        })
    }

    /// Tell the handler to close the socket and hand back the session
    pub fn close(self) -> Session {
        // The handler may already be gone
        let _ = self.closer.send(());
        self.session
    }
}
