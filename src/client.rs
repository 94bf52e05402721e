//! Programmatic chat client
//!
//! Speaks the frame protocol over TCP. Each helper sends one request; replies
//! are read with [`ChatClient::next_reply`], since one request may produce
//! several replies (queued messages) and pushed chat messages can arrive at
//! any time.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::codec::{Frame, FrameCodec};
use crate::error::AppError;
use crate::message::{Reply, Request};

pub struct ChatClient {
    framed: Framed<TcpStream, FrameCodec>,
}

impl ChatClient {
    /// Connect to a chat server
    ///
    /// The server's greeting is left unread.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, AppError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, FrameCodec::default()),
        })
    }

    /// Send a raw frame
    pub async fn send_frame(&mut self, frame: Frame) -> Result<(), AppError> {
        self.framed.send(frame).await?;
        Ok(())
    }

    pub async fn send(&mut self, request: Request) -> Result<(), AppError> {
        self.send_frame(request.into_frame()).await
    }

    /// Wait for the next reply from the server
    pub async fn next_reply(&mut self) -> Result<Reply, AppError> {
        match self.framed.next().await {
            Some(Ok(frame)) => {
                let status = frame.opcode;
                Reply::from_frame(frame).ok_or(AppError::UnknownReplyStatus(status))
            }
            Some(Err(e)) => Err(e.into()),
            None => Err(AppError::ConnectionClosed),
        }
    }

    /// Send a request and read the first reply
    pub async fn request(&mut self, request: Request) -> Result<Reply, AppError> {
        self.send(request).await?;
        self.next_reply().await
    }

    pub async fn list_accounts(&mut self, pattern: &str) -> Result<Reply, AppError> {
        self.request(Request::ListAccounts {
            pattern: pattern.to_string(),
        })
        .await
    }

    pub async fn create_account(&mut self, username: &str) -> Result<Reply, AppError> {
        self.request(Request::CreateAccount {
            username: username.to_string(),
        })
        .await
    }

    pub async fn login(&mut self, username: &str) -> Result<Reply, AppError> {
        self.request(Request::Login {
            username: username.to_string(),
        })
        .await
    }

    pub async fn logout(&mut self) -> Result<Reply, AppError> {
        self.request(Request::Logout).await
    }

    pub async fn delete_account(&mut self) -> Result<Reply, AppError> {
        self.request(Request::DeleteAccount).await
    }

    /// Send `body` to `recipient`; reads the caller's confirmation
    pub async fn send_message(&mut self, recipient: &str, body: &str) -> Result<Reply, AppError> {
        self.request(Request::SendMessage {
            content: format!("{recipient}|{body}"),
        })
        .await
    }

    /// Ask for queued messages; read them with `next_reply`
    pub async fn deliver_undelivered(&mut self) -> Result<(), AppError> {
        self.send(Request::DeliverUndelivered).await
    }
}
