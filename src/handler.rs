//! TCP connection handler
//!
//! Handles one client connection: frames the socket, forwards decoded
//! requests to the ChatServer, and writes the server's replies back.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::codec::FrameCodec;
use crate::config::ServerConfig;
use crate::error::{AppError, FrameError};
use crate::connection::ReplyBatch;
use crate::message::Request;
use crate::server::{ChatServer, ServerCommand};
use crate::types::ConnectionId;

/// How long queued replies may take to flush after the peer stops sending
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Start the ChatServer actor and accept connections on `listener` forever
///
/// Each accepted socket gets its own handler task.
pub async fn serve(listener: TcpListener, config: ServerConfig) {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    tokio::spawn(ChatServer::new(cmd_rx).run());
    info!("ChatServer actor started");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();
                let config = config.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx, &config).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a new TCP connection
///
/// Runs a read task (socket -> ServerCommand) and a write task
/// (Reply -> socket). When either ends the server is told to disconnect,
/// which logs the session out and closes the reply channel. When the server
/// drops the connection itself the reader stops at once and the writer gets
/// `DRAIN_TIMEOUT` to flush, so a peer that never reads is still closed.
///
/// A peer that hangs up, resets or sends a malformed frame ends the
/// connection with `Ok(())`; errors are kept for server-side failures.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    config: &ServerConfig,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let framed = Framed::new(stream, FrameCodec::new(config.max_payload));
    let (mut sink, mut frames) = framed.split();

    let connection_id = ConnectionId::new();
    info!("Connection {} opened from {}", connection_id, peer_addr);

    // Channel for server -> connection replies
    let (reply_tx, mut reply_rx) = mpsc::channel::<ReplyBatch>(config.outbound_buffer);
    let (closer, mut closed) = oneshot::channel();

    if cmd_tx
        .send(ServerCommand::Connect {
            connection_id,
            sender: reply_tx,
            closer,
        })
        .await
        .is_err()
    {
        error!("Failed to register connection {} - server closed", connection_id);
        return Err(AppError::ChannelSend);
    }

    let cmd_tx_read = cmd_tx.clone();

    let mut read_task = tokio::spawn(async move {
        while let Some(result) = frames.next().await {
            match result {
                Ok(frame) => {
                    let request = Request::from_frame(frame);
                    let cmd = ServerCommand::Request {
                        connection_id,
                        request,
                    };
                    if cmd_tx_read.send(cmd).await.is_err() {
                        debug!("Server closed, ending read task for {}", connection_id);
                        return Err(AppError::ChannelSend);
                    }
                }
                Err(FrameError::Io(e)) => {
                    debug!("Read error on {}: {}", connection_id, e);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Malformed frame from {}, closing: {}", connection_id, e);
                    return Ok(());
                }
            }
        }
        debug!("Connection {} closed by peer", connection_id);
        Ok(())
    });

    let mut write_task = tokio::spawn(async move {
        while let Some(batch) = reply_rx.recv().await {
            for reply in batch {
                if let Err(e) = sink.feed(reply.into_frame()).await {
                    debug!("Write error on {}: {}", connection_id, e);
                    return Ok(());
                }
            }
            if let Err(e) = sink.flush().await {
                debug!("Write error on {}: {}", connection_id, e);
                return Ok(());
            }
        }
        let _ = sink.close().await;
        Ok::<(), AppError>(())
    });

    let disconnect = ServerCommand::Disconnect { connection_id };

    let outcome = tokio::select! {
        res = &mut read_task => {
            // Let replies to the last requests go out before closing
            let _ = cmd_tx.send(disconnect).await;
            if timeout(DRAIN_TIMEOUT, &mut write_task).await.is_err() {
                debug!("Write task for {} did not drain in time", connection_id);
                write_task.abort();
            }
            res
        }
        res = &mut write_task => {
            read_task.abort();
            let _ = cmd_tx.send(disconnect).await;
            res
        }
        _ = &mut closed => {
            // Already removed by the server; flush what it handed over, if the peer reads
            debug!("Server dropped connection {}", connection_id);
            read_task.abort();
            if timeout(DRAIN_TIMEOUT, &mut write_task).await.is_err() {
                debug!("Write task for {} did not drain in time", connection_id);
                write_task.abort();
            }
            Ok(Ok(()))
        }
    };

    info!("Connection {} closed", connection_id);

    match outcome {
        Ok(result) => result,
        Err(join_err) => {
            error!("Connection task for {} failed: {}", connection_id, join_err);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::codec::{encode_frame, Frame};

    const WAIT: Duration = Duration::from_secs(10);

    /// Accept one connection and run its handler against a fresh server
    async fn handle_one(config: ServerConfig) -> (TcpStream, JoinHandle<Result<(), AppError>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
        tokio::spawn(ChatServer::new(cmd_rx).run());

        let peer = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let handler =
            tokio::spawn(async move { handle_connection(stream, cmd_tx, &config).await });
        (peer, handler)
    }

    #[tokio::test]
    async fn test_malformed_frame_is_not_a_server_error() {
        let (mut peer, handler) = handle_one(ServerConfig::default()).await;

        peer.write_all(&[0, 0, 0, 2, 5, 0xff, 0xfe]).await.unwrap();
        let result = timeout(WAIT, handler).await.unwrap().unwrap();
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn test_peer_hangup_is_not_a_server_error() {
        let (peer, handler) = handle_one(ServerConfig::default()).await;

        drop(peer);
        let result = timeout(WAIT, handler).await.unwrap().unwrap();
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn test_peer_that_never_reads_is_closed() {
        let config = ServerConfig {
            outbound_buffer: 1,
            ..ServerConfig::default()
        };
        let (mut peer, handler) = handle_one(config).await;

        // Keep asking without ever reading the replies
        let list = encode_frame(&Frame::new(0, "")).unwrap();
        let chunk: Vec<u8> = list.iter().copied().cycle().take(list.len() * 1000).collect();
        let flood = tokio::spawn(async move {
            while peer.write_all(&chunk).await.is_ok() {}
        });

        let result = timeout(WAIT + DRAIN_TIMEOUT, handler)
            .await
            .expect("handler closes a peer that stopped reading")
            .unwrap();
        assert!(result.is_ok(), "{result:?}");
        flood.abort();
    }
}
