//! Account store
//!
//! Registered usernames and their offline mailboxes. Accounts are kept in a
//! sorted map so listing order is deterministic.

use std::collections::{BTreeMap, VecDeque};

use regex::Regex;

use crate::error::ChatError;

/// A registered account
///
/// Holds undelivered messages in arrival order.
#[derive(Debug, Default)]
pub struct Account {
    mailbox: VecDeque<String>,
}

impl Account {
    /// Number of queued messages
    pub fn pending(&self) -> usize {
        self.mailbox.len()
    }

    /// Queued messages, oldest first
    pub fn mailbox(&self) -> impl Iterator<Item = &str> {
        self.mailbox.iter().map(String::as_str)
    }
}

/// Check a username for account creation
///
/// Non-empty, no whitespace, no `|`.
pub fn validate_username(username: &str) -> Result<(), ChatError> {
    if username.chars().any(|c| c.is_whitespace() || c == '|') {
        return Err(ChatError::UsernameFormat);
    }
    if username.is_empty() {
        return Err(ChatError::EmptyUsername);
    }
    Ok(())
}

/// All registered accounts: username -> Account
#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: BTreeMap<String, Account>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.accounts.contains_key(username)
    }

    pub fn get(&self, username: &str) -> Option<&Account> {
        self.accounts.get(username)
    }

    /// Register a new account with an empty mailbox
    ///
    /// Validates the username and checks uniqueness; nothing changes on error.
    pub fn create(&mut self, username: &str) -> Result<(), ChatError> {
        validate_username(username)?;
        if self.accounts.contains_key(username) {
            return Err(ChatError::AlreadyExists(username.to_string()));
        }
        self.accounts.insert(username.to_string(), Account::default());
        Ok(())
    }

    /// Remove an account and its mailbox
    pub fn remove(&mut self, username: &str) -> Result<Account, ChatError> {
        self.accounts
            .remove(username)
            .ok_or_else(|| ChatError::NotFound(username.to_string()))
    }

    /// Append a message to the tail of an account's mailbox
    pub fn enqueue(&mut self, username: &str, message: String) -> Result<(), ChatError> {
        let account = self
            .accounts
            .get_mut(username)
            .ok_or_else(|| ChatError::NotFound(username.to_string()))?;
        account.mailbox.push_back(message);
        Ok(())
    }

    /// Take every queued message, oldest first, leaving the mailbox empty
    pub fn drain(&mut self, username: &str) -> Result<Vec<String>, ChatError> {
        let account = self
            .accounts
            .get_mut(username)
            .ok_or_else(|| ChatError::NotFound(username.to_string()))?;
        Ok(account.mailbox.drain(..).collect())
    }

    /// Put messages back at the head of a mailbox, keeping their order
    pub fn requeue(&mut self, username: &str, messages: Vec<String>) -> Result<(), ChatError> {
        let account = self
            .accounts
            .get_mut(username)
            .ok_or_else(|| ChatError::NotFound(username.to_string()))?;
        for message in messages.into_iter().rev() {
            account.mailbox.push_front(message);
        }
        Ok(())
    }

    /// Usernames the pattern matches at their start, in sorted order
    pub fn matching(&self, pattern: &Regex) -> Vec<&str> {
        self.accounts
            .keys()
            .filter(|name| pattern.find(name).is_some_and(|m| m.start() == 0))
            .map(String::as_str)
            .collect()
    }
}
