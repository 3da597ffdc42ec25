use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

/// Telegram allows roughly one message per second into a single chat.
pub const DEFAULT_CHAT_INTERVAL: Duration = Duration::from_millis(1050);

/// MessagingPort decorator that paces messages per chat.
///
/// All notifications go to the admin chat, so a burst of new events (e.g. after
/// a long outage) is spread out instead of collecting 429s. Deletes and callback
/// answers are not messages and pass straight through.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    interval: Duration,
    next_slot: Mutex<HashMap<ChatId, Instant>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve the next free slot for `chat_id` and wait for it.
    async fn pace(&self, chat_id: ChatId) {
        let wait = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots
                .get(&chat_id)
                .copied()
                .filter(|next| *next > now)
                .unwrap_or(now);
            slots.insert(chat_id, slot + self.interval);
            slot - now
        };
        if !wait.is_zero() {
            tracing::debug!(chat_id = chat_id.0, wait_ms = wait.as_millis() as u64, "pacing send");
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.pace(chat_id).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.pace(chat_id).await;
        self.inner.send_text(chat_id, text).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.inner.delete_message(msg).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.pace(chat_id).await;
        self.inner
            .send_inline_keyboard(chat_id, text, keyboard)
            .await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.inner.answer_callback_query(callback_id, text).await
    }
}
