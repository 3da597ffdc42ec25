//! Formatting utilities (notification → Telegram HTML / plain text).

use std::sync::OnceLock;

use regex::Regex;

use crate::{domain::NotificationEvent, utils::format_local_time, utils::Timezone};

const UNKNOWN_GROUP: &str = "Unknown";

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Strip the platform's HTML markup from a notification body.
pub fn clean_html(text: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| Regex::new(r"(?s)<.*?>").expect("valid regex"));
    // `&amp;` goes last so `&amp;lt;` stays `&lt;`.
    re.replace_all(text, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Truncate to at most `max_chars` characters, marking the cut with `…`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.push('…');
    out
}

/// Renders notifications for the chat.
#[derive(Clone, Copy, Debug)]
pub struct NotificationFormatter {
    pub zone: Timezone,
    /// Upper bound for the message body (characters), leaving room for the header.
    pub max_body_chars: usize,
}

impl NotificationFormatter {
    pub fn new(zone: Timezone, max_message_len: usize) -> Self {
        Self {
            zone,
            max_body_chars: max_message_len.saturating_sub(300).max(100),
        }
    }

    fn body(&self, event: &NotificationEvent) -> String {
        truncate_chars(&clean_html(&event.message), self.max_body_chars)
    }

    pub fn html(&self, event: &NotificationEvent) -> String {
        let time = format_local_time(&event.time, self.zone);
        let group = event.group_name.as_deref().unwrap_or(UNKNOWN_GROUP);
        format!(
            "🔔 <b>New notification</b>\n\
<b>📅 Time:</b> {}\n\
<b>📋 Type:</b> {}\n\
<b>💬 Message:</b>\n{}\n\
<b>🆔 ID:</b> <code>{}</code>",
            escape_html(&time),
            escape_html(group),
            escape_html(&self.body(event)),
            escape_html(&event.id.0),
        )
    }

    pub fn plain(&self, event: &NotificationEvent) -> String {
        let time = format_local_time(&event.time, self.zone);
        let group = event.group_name.as_deref().unwrap_or(UNKNOWN_GROUP);
        format!(
            "🔔 New notification\nTime: {time}\nType: {group}\nMessage:\n{}\nID: {}",
            self.body(event),
            event.id
        )
    }
}
