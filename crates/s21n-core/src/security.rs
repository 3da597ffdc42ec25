use crate::domain::ChatId;

// ============== Authorization ==============

/// Outcome of checking a chat against the configured admin chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAccess {
    Admin,
    /// No admin chat configured yet; this chat may claim it with `/start`.
    Unbound,
    Denied,
}

pub fn chat_access(admin_chat: Option<ChatId>, chat_id: ChatId) -> ChatAccess {
    match admin_chat {
        None => ChatAccess::Unbound,
        Some(admin) if admin == chat_id => ChatAccess::Admin,
        Some(_) => ChatAccess::Denied,
    }
}

pub fn is_authorized(admin_chat: Option<ChatId>, chat_id: ChatId) -> bool {
    chat_access(admin_chat, chat_id) == ChatAccess::Admin
}
