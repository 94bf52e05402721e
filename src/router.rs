//! Chat router
//!
//! Validates one request against the caller's session, applies it to the
//! account store and presence registry, and returns the replies it produced
//! together with the connection each one is addressed to.
//!
//! The router is plain synchronous state. Exclusive access comes from its
//! owner, the [`ChatServer`](crate::server::ChatServer) actor, which runs
//! every request to completion before looking at the next one.

use regex::Regex;
use tracing::{debug, info};

use crate::account::AccountStore;
use crate::error::ChatError;
use crate::message::{parse_direct_message, Reply, Request};
use crate::presence::PresenceRegistry;
use crate::session::Session;
use crate::types::ConnectionId;

/// A reply addressed to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: ConnectionId,
    pub reply: Reply,
}

impl Delivery {
    pub fn new(to: ConnectionId, reply: Reply) -> Self {
        Self { to, reply }
    }
}

type Outcome = Result<Vec<Delivery>, ChatError>;

/// Account store + presence registry behind the operation table
#[derive(Debug, Default)]
pub struct ChatRouter {
    accounts: AccountStore,
    presence: PresenceRegistry,
}

impl ChatRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Execute one request for `session`
    ///
    /// Business errors come back as an error reply to the caller and leave
    /// all state as it was.
    pub fn handle(&mut self, session: &mut Session, request: Request) -> Vec<Delivery> {
        let caller = session.id();
        debug!("Connection {} request {:?}", caller, request);

        if request.requires_login() && !self.is_logged_in(session) {
            return vec![Delivery::new(caller, ChatError::NotAuthenticated.into())];
        }

        let outcome = match request {
            Request::ListAccounts { pattern } => self.list_accounts(caller, &pattern),
            Request::CreateAccount { username } => self.create_account(session, username),
            Request::Login { username } => self.login(session, username),
            Request::Logout => self.logout(session),
            Request::DeleteAccount => self.delete_account(session),
            Request::SendMessage { content } => self.send_message(session, &content),
            Request::DeliverUndelivered => self.deliver_undelivered(session),
            Request::Unknown(opcode) => Err(ChatError::UnknownOperation(opcode)),
        };

        outcome.unwrap_or_else(|err| {
            debug!("Connection {} rejected: {}", caller, err);
            vec![Delivery::new(caller, err.into())]
        })
    }

    /// Release the session's binding when its connection goes away
    ///
    /// The account stays registered. Returns true if a username was released.
    pub fn disconnect(&mut self, session: &mut Session) -> bool {
        match session.unbind() {
            Some(username) => {
                let released = self.presence.release(&username, session.id());
                info!("Account \"{}\" went offline on disconnect", username);
                released
            }
            None => false,
        }
    }

    /// Put chat messages the session's connection never received back into
    /// its account's mailbox, ahead of anything queued since
    ///
    /// Returns the number of messages saved.
    pub fn requeue(&mut self, session: &Session, messages: Vec<String>) -> usize {
        let Some(username) = session.username() else {
            return 0;
        };
        let count = messages.len();
        if count == 0 {
            return 0;
        }
        match self.accounts.requeue(username, messages) {
            Ok(()) => {
                info!("Requeued {} undelivered messages for \"{}\"", count, username);
                count
            }
            Err(err) => {
                debug!("Could not requeue for \"{}\": {}", username, err);
                0
            }
        }
    }

    fn is_logged_in(&self, session: &Session) -> bool {
        session
            .username()
            .is_some_and(|name| self.presence.connection_of(name) == Some(session.id()))
    }

    /// Drop any previous binding before the session takes a new name
    fn release_binding(&mut self, session: &mut Session) {
        if let Some(previous) = session.unbind() {
            self.presence.release(&previous, session.id());
            debug!("Connection {} released \"{}\"", session.id(), previous);
        }
    }

    fn list_accounts(&self, caller: ConnectionId, pattern: &str) -> Outcome {
        let filter =
            Regex::new(pattern).map_err(|_| ChatError::InvalidPattern(pattern.to_string()))?;
        let names = self.accounts.matching(&filter);
        let reply = Reply::notice(format!("List of accounts: {names:?}"));
        Ok(vec![Delivery::new(caller, reply)])
    }

    fn create_account(&mut self, session: &mut Session, username: String) -> Outcome {
        self.accounts.create(&username)?;
        self.release_binding(session);
        self.presence.bind(&username, session.id());
        info!("Connection {} created account \"{}\"", session.id(), username);

        let reply = Reply::notice(format!("Account created with username \"{username}\"."));
        session.bind(username);
        Ok(vec![Delivery::new(session.id(), reply)])
    }

    fn login(&mut self, session: &mut Session, username: String) -> Outcome {
        if !self.accounts.contains(&username) {
            return Err(ChatError::NotFound(username));
        }
        if self.presence.is_online(&username) {
            return Err(ChatError::AlreadyOnline(username));
        }

        self.release_binding(session);
        self.presence.bind(&username, session.id());
        info!("Connection {} logged into \"{}\"", session.id(), username);

        let reply = Reply::notice(format!("Account \"{username}\" logged in."));
        session.bind(username);
        Ok(vec![Delivery::new(session.id(), reply)])
    }

    fn logout(&mut self, session: &mut Session) -> Outcome {
        let Some(username) = session.unbind() else {
            return Err(ChatError::NotAuthenticated);
        };
        self.presence.release(&username, session.id());
        info!("Connection {} logged out of \"{}\"", session.id(), username);

        let reply = Reply::notice(format!("Account \"{username}\" logged out."));
        Ok(vec![Delivery::new(session.id(), reply)])
    }

    fn delete_account(&mut self, session: &mut Session) -> Outcome {
        let Some(username) = session.username().map(str::to_string) else {
            return Err(ChatError::NotAuthenticated);
        };

        self.accounts.remove(&username)?;
        self.presence.release(&username, session.id());
        session.unbind();
        info!("Connection {} deleted account \"{}\"", session.id(), username);

        let reply = Reply::notice(format!("Account \"{username}\" deleted."));
        Ok(vec![Delivery::new(session.id(), reply)])
    }

    fn send_message(&mut self, session: &Session, content: &str) -> Outcome {
        let Some(sender) = session.username() else {
            return Err(ChatError::NotAuthenticated);
        };
        let (recipient, body) = parse_direct_message(content)?;
        if !self.accounts.contains(recipient) {
            return Err(ChatError::NotFound(recipient.to_string()));
        }

        let text = format!("<{sender}> {body}");
        let caller = session.id();

        match self.presence.connection_of(recipient) {
            Some(connection) => {
                debug!("Delivering message from \"{}\" to \"{}\"", sender, recipient);
                Ok(vec![
                    Delivery::new(connection, Reply::message(text)),
                    Delivery::new(
                        caller,
                        Reply::notice(format!("Message sent to \"{recipient}\".")),
                    ),
                ])
            }
            None => {
                self.accounts.enqueue(recipient, text)?;
                debug!("Queued message from \"{}\" for \"{}\"", sender, recipient);
                Ok(vec![Delivery::new(
                    caller,
                    Reply::notice(format!(
                        "Account \"{recipient}\" not online. Message queued to send."
                    )),
                )])
            }
        }
    }

    fn deliver_undelivered(&mut self, session: &Session) -> Outcome {
        let Some(username) = session.username() else {
            return Err(ChatError::NotAuthenticated);
        };
        let caller = session.id();
        let queued = self.accounts.drain(username)?;

        if queued.is_empty() {
            return Ok(vec![Delivery::new(
                caller,
                Reply::notice("No messages queued"),
            )]);
        }

        debug!("Delivering {} queued messages to \"{}\"", queued.len(), username);
        Ok(queued
            .into_iter()
            .map(|text| Delivery::new(caller, Reply::message(text)))
            .collect())
    }
}
