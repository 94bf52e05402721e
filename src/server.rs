//! ChatServer Actor implementation
//!
//! The central actor owning all shared state: the router (accounts and
//! presence) and every live connection. Commands from connection handlers
//! arrive over one mpsc channel and run to completion one at a time, which
//! makes every check-then-act in the router atomic without locks.
//!
//! The actor never touches a socket. The replies one command produces for a
//! connection are handed to its outbound channel as a single batch with
//! `try_send`; a connection whose buffer is full is dropped rather than
//! allowed to stall everyone else. Chat messages in a batch that could not
//! be handed over go back to the recipient's mailbox.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::connection::{Connection, ReplyBatch, Undelivered};
use crate::error::SendError;
use crate::message::{Reply, ReplyKind, Request};
use crate::router::{ChatRouter, Delivery};
use crate::types::ConnectionId;

/// Greeting sent to every new connection
pub const GREETING: &str = "Connected to server";

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New connection accepted
    Connect {
        connection_id: ConnectionId,
        sender: mpsc::Sender<ReplyBatch>,
        /// Fired if the server drops the connection on its own
        closer: oneshot::Sender<()>,
    },
    /// Decoded request from a connection
    Request {
        connection_id: ConnectionId,
        request: Request,
    },
    /// Connection closed or failed
    Disconnect { connection_id: ConnectionId },
}

/// The main ChatServer actor
pub struct ChatServer {
    /// Accounts, mailboxes and presence
    router: ChatRouter,
    /// All live connections: ConnectionId -> Connection
    connections: HashMap<ConnectionId, Connection>,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            router: ChatRouter::new(),
            connections: HashMap::new(),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect {
                connection_id,
                sender,
                closer,
            } => {
                self.handle_connect(connection_id, sender, closer);
            }
            ServerCommand::Request {
                connection_id,
                request,
            } => {
                self.handle_request(connection_id, request);
            }
            ServerCommand::Disconnect { connection_id } => {
                self.handle_disconnect(connection_id);
            }
        }
    }

    /// Register a new connection and greet it
    fn handle_connect(
        &mut self,
        connection_id: ConnectionId,
        sender: mpsc::Sender<ReplyBatch>,
        closer: oneshot::Sender<()>,
    ) {
        info!("Connection {} registered", connection_id);
        let connection = Connection::new(connection_id, sender, closer);
        self.connections.insert(connection_id, connection);
        self.dispatch(vec![Delivery::new(connection_id, Reply::notice(GREETING))]);
        self.log_counts();
    }

    /// Run one request through the router and deliver its replies
    fn handle_request(&mut self, connection_id: ConnectionId, request: Request) {
        let Some(connection) = self.connections.get_mut(&connection_id) else {
            debug!("Ignoring request from unknown connection {}", connection_id);
            return;
        };

        let deliveries = self.router.handle(&mut connection.session, request);
        self.dispatch(deliveries);
    }

    /// Handle connection teardown
    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        if self.drop_connection(connection_id) {
            info!("Connection {} disconnected", connection_id);
        }
    }

    /// Hand replies to their connections' writer tasks, one batch each
    fn dispatch(&mut self, deliveries: Vec<Delivery>) {
        let mut stalled = Vec::new();

        for (to, batch) in batch_by_connection(deliveries) {
            let Some(connection) = self.connections.get(&to) else {
                debug!("Dropping reply for unknown connection {}", to);
                continue;
            };

            let Err(Undelivered { reason, batch }) = connection.deliver(batch) else {
                continue;
            };
            let messages = chat_messages(batch);
            let saved = self.router.requeue(&connection.session, messages);

            match reason {
                SendError::Backpressure => {
                    warn!(
                        "Connection {} is not reading its replies, dropping it ({} messages requeued)",
                        to, saved
                    );
                    stalled.push(to);
                }
                SendError::ChannelClosed => {
                    debug!("Connection {} already closed ({} messages requeued)", to, saved);
                }
            }
        }

        for connection_id in stalled {
            self.drop_connection(connection_id);
        }
    }

    /// Remove a connection, releasing any account it was logged into
    ///
    /// This is the only place a session is discarded, so its presence entry
    /// is released exactly once. Closing the record signals the handler and
    /// drops the outbound sender, which ends the connection's writer task.
    fn drop_connection(&mut self, connection_id: ConnectionId) -> bool {
        let Some(connection) = self.connections.remove(&connection_id) else {
            return false;
        };
        let mut session = connection.close();
        self.router.disconnect(&mut session);
        self.log_counts();
        true
    }

    fn log_counts(&self) {
        debug!(
            "Total connections: {}, accounts: {}, online: {}",
            self.connections.len(),
            self.router.accounts().len(),
            self.router.presence().len()
        );
    }
}

/// Group deliveries per connection, keeping first-seen and reply order
fn batch_by_connection(deliveries: Vec<Delivery>) -> Vec<(ConnectionId, ReplyBatch)> {
    let mut batches: Vec<(ConnectionId, ReplyBatch)> = Vec::new();
    for Delivery { to, reply } in deliveries {
        match batches.iter_mut().find(|(id, _)| *id == to) {
            Some((_, batch)) => batch.push(reply),
            None => batches.push((to, vec![reply])),
        }
    }
    batches
}

fn chat_messages(batch: ReplyBatch) -> Vec<String> {
    batch
        .into_iter()
        .filter(|reply| reply.kind == ReplyKind::Message)
        .map(|reply| reply.text)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_secs(1);

    struct TestConnection {
        id: ConnectionId,
        rx: mpsc::Receiver<ReplyBatch>,
        closed: oneshot::Receiver<()>,
    }

    impl TestConnection {
        async fn next_batch(&mut self) -> ReplyBatch {
            timeout(WAIT, self.rx.recv())
                .await
                .expect("reply within timeout")
                .expect("channel open")
        }

        async fn next(&mut self) -> Reply {
            let mut batch = self.next_batch().await;
            assert_eq!(batch.len(), 1, "{batch:?}");
            batch.remove(0)
        }
    }

    fn spawn_server() -> mpsc::Sender<ServerCommand> {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(ChatServer::new(cmd_rx).run());
        cmd_tx
    }

    async fn connect(cmd_tx: &mpsc::Sender<ServerCommand>, capacity: usize) -> TestConnection {
        let connection_id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(capacity);
        let (closer, closed) = oneshot::channel();
        cmd_tx
            .send(ServerCommand::Connect {
                connection_id,
                sender: tx,
                closer,
            })
            .await
            .unwrap();
        TestConnection {
            id: connection_id,
            rx,
            closed,
        }
    }

    async fn request(
        cmd_tx: &mpsc::Sender<ServerCommand>,
        connection_id: ConnectionId,
        request: Request,
    ) {
        cmd_tx
            .send(ServerCommand::Request {
                connection_id,
                request,
            })
            .await
            .unwrap();
    }

    fn create(name: &str) -> Request {
        Request::CreateAccount {
            username: name.to_string(),
        }
    }

    fn send_to(content: &str) -> Request {
        Request::SendMessage {
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_greeting_on_connect() {
        let cmd_tx = spawn_server();
        let mut conn = connect(&cmd_tx, 8).await;

        let greeting = conn.next().await;
        assert_eq!(greeting.kind, ReplyKind::Notice);
        assert_eq!(greeting.text, "<server> Connected to server");
    }

    #[tokio::test]
    async fn test_direct_message_between_connections() {
        let cmd_tx = spawn_server();
        let mut alice = connect(&cmd_tx, 8).await;
        let mut bob = connect(&cmd_tx, 8).await;
        alice.next().await;
        bob.next().await;

        request(&cmd_tx, alice.id, create("alice")).await;
        request(&cmd_tx, bob.id, create("bob")).await;
        alice.next().await;
        bob.next().await;

        request(&cmd_tx, alice.id, send_to("bob|hi")).await;
        assert_eq!(bob.next().await, Reply::message("<alice> hi"));
        assert_eq!(alice.next().await, Reply::notice("Message sent to \"bob\"."));
    }

    #[tokio::test]
    async fn test_disconnect_releases_username() {
        let cmd_tx = spawn_server();
        let mut first = connect(&cmd_tx, 8).await;
        first.next().await;
        request(&cmd_tx, first.id, create("alice")).await;
        first.next().await;

        cmd_tx
            .send(ServerCommand::Disconnect {
                connection_id: first.id,
            })
            .await
            .unwrap();
        // Dropping the connection drops its sender
        assert!(timeout(WAIT, first.rx.recv()).await.unwrap().is_none());

        let mut second = connect(&cmd_tx, 8).await;
        second.next().await;
        request(&cmd_tx, second.id, Request::Login { username: "alice".into() }).await;
        assert_eq!(
            second.next().await,
            Reply::notice("Account \"alice\" logged in.")
        );
    }

    #[tokio::test]
    async fn test_large_mailbox_drains_in_one_slot() {
        let cmd_tx = spawn_server();
        let mut alice = connect(&cmd_tx, 8).await;
        // Far fewer slots than queued messages
        let mut bob = connect(&cmd_tx, 2).await;
        alice.next().await;
        bob.next().await;

        request(&cmd_tx, bob.id, create("bob")).await;
        bob.next().await;
        request(&cmd_tx, bob.id, Request::Logout).await;
        bob.next().await;

        request(&cmd_tx, alice.id, create("alice")).await;
        alice.next().await;
        for i in 0..100 {
            request(&cmd_tx, alice.id, send_to(&format!("bob|{i}"))).await;
            assert!(alice.next().await.text.contains("queued"));
        }

        request(&cmd_tx, bob.id, Request::Login { username: "bob".into() }).await;
        bob.next().await;
        request(&cmd_tx, bob.id, Request::DeliverUndelivered).await;

        let batch = bob.next_batch().await;
        let expected: Vec<Reply> = (0..100)
            .map(|i| Reply::message(format!("<alice> {i}")))
            .collect();
        assert_eq!(batch, expected);

        request(&cmd_tx, bob.id, Request::DeliverUndelivered).await;
        assert_eq!(bob.next().await, Reply::notice("No messages queued"));
    }

    #[tokio::test]
    async fn test_stalled_connection_is_dropped() {
        let cmd_tx = spawn_server();
        let mut alice = connect(&cmd_tx, 8).await;
        // Room for the greeting and one reply, never drained
        let mut bob = connect(&cmd_tx, 2).await;
        alice.next().await;

        request(&cmd_tx, bob.id, create("bob")).await;
        request(&cmd_tx, alice.id, create("alice")).await;
        alice.next().await;

        // Bob's buffer is full: the delivery fails and bob is disconnected
        request(&cmd_tx, alice.id, send_to("bob|one")).await;
        alice.next().await;

        // Bob is offline now, so the next message is queued
        request(&cmd_tx, alice.id, send_to("bob|two")).await;
        let queued = alice.next().await;
        assert!(queued.text.contains("not online"), "{}", queued.text);

        // The handler is told to close the socket
        assert_eq!(timeout(WAIT, &mut bob.closed).await.unwrap(), Ok(()));
        assert_eq!(bob.next().await.text, "<server> Connected to server");
        assert_eq!(
            bob.next().await.text,
            "<server> Account created with username \"bob\"."
        );
        assert!(timeout(WAIT, bob.rx.recv()).await.unwrap().is_none());

        // The message that never reached bob was kept, ahead of the later one
        let mut again = connect(&cmd_tx, 8).await;
        again.next().await;
        request(&cmd_tx, again.id, Request::Login { username: "bob".into() }).await;
        again.next().await;
        request(&cmd_tx, again.id, Request::DeliverUndelivered).await;
        assert_eq!(
            again.next_batch().await,
            vec![Reply::message("<alice> one"), Reply::message("<alice> two")]
        );
    }

    #[tokio::test]
    async fn test_stalled_drain_keeps_the_mailbox() {
        let cmd_tx = spawn_server();
        let mut alice = connect(&cmd_tx, 8).await;
        let mut bob = connect(&cmd_tx, 2).await;
        alice.next().await;

        request(&cmd_tx, alice.id, create("alice")).await;
        alice.next().await;
        bob.next().await;
        request(&cmd_tx, bob.id, create("bob")).await;
        bob.next().await;
        request(&cmd_tx, bob.id, Request::Logout).await;
        bob.next().await;

        request(&cmd_tx, alice.id, send_to("bob|one")).await;
        alice.next().await;
        request(&cmd_tx, alice.id, send_to("bob|two")).await;
        alice.next().await;

        // Bob stops reading: login and list fill the buffer, the drain does not fit
        request(&cmd_tx, bob.id, Request::Login { username: "bob".into() }).await;
        request(&cmd_tx, bob.id, Request::ListAccounts { pattern: String::new() }).await;
        request(&cmd_tx, bob.id, Request::DeliverUndelivered).await;
        assert_eq!(timeout(WAIT, &mut bob.closed).await.unwrap(), Ok(()));

        let mut again = connect(&cmd_tx, 8).await;
        again.next().await;
        request(&cmd_tx, again.id, Request::Login { username: "bob".into() }).await;
        again.next().await;
        request(&cmd_tx, again.id, Request::DeliverUndelivered).await;
        assert_eq!(
            again.next_batch().await,
            vec![Reply::message("<alice> one"), Reply::message("<alice> two")]
        );
    }

    #[tokio::test]
    async fn test_concurrent_creates_pick_one_owner() {
        let cmd_tx = spawn_server();
        let mut conns = Vec::new();
        for _ in 0..8 {
            let mut conn = connect(&cmd_tx, 8).await;
            conn.next().await;
            conns.push(conn);
        }

        let sends = conns.iter().map(|conn| {
            let cmd_tx = cmd_tx.clone();
            let id = conn.id;
            tokio::spawn(async move { request(&cmd_tx, id, create("alice")).await })
        });
        for handle in sends.collect::<Vec<_>>() {
            handle.await.unwrap();
        }

        let mut created = 0;
        for conn in &mut conns {
            let reply = conn.next().await;
            if reply.is_error() {
                assert!(reply.text.contains("already in use"), "{}", reply.text);
            } else {
                created += 1;
            }
        }
        assert_eq!(created, 1);

        request(&cmd_tx, conns[0].id, Request::ListAccounts { pattern: String::new() }).await;
        assert_eq!(
            conns[0].next().await.text,
            "<server> List of accounts: [\"alice\"]"
        );
    }

    #[tokio::test]
    async fn test_requests_from_unknown_connection_are_ignored() {
        let cmd_tx = spawn_server();
        request(&cmd_tx, ConnectionId::new(), Request::Logout).await;

        let mut conn = connect(&cmd_tx, 8).await;
        assert_eq!(conn.next().await, Reply::notice(GREETING));
    }

    #[test]
    fn test_batch_by_connection_keeps_order() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let batches = batch_by_connection(vec![
            Delivery::new(b, Reply::message("1")),
            Delivery::new(a, Reply::notice("2")),
            Delivery::new(b, Reply::message("3")),
        ]);
        assert_eq!(
            batches,
            vec![
                (b, vec![Reply::message("1"), Reply::message("3")]),
                (a, vec![Reply::notice("2")]),
            ]
        );
    }
}
