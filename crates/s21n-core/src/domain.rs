use std::fmt;

use serde::{Deserialize, Serialize};

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Platform login + password.
///
/// Immutable for the lifetime of a monitoring run; `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A selectable campus (the platform calls it a school).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Campus {
    pub id: String,
    pub name: String,
}

/// Identity of a notification. Two events with the same id are the same event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationId(pub String);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single platform notification as seen by a fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationEvent {
    pub id: NotificationId,
    /// Body as sent by the platform (may contain HTML).
    pub message: String,
    /// Raw RFC3339 timestamp (UTC).
    pub time: String,
    pub group_name: Option<String>,
    pub related_object_type: Option<String>,
    pub was_read: bool,
}

impl NotificationEvent {
    pub fn new(id: impl Into<String>, message: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            id: NotificationId(id.into()),
            message: message.into(),
            time: time.into(),
            group_name: None,
            related_object_type: None,
            was_read: false,
        }
    }
}
