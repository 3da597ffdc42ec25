use std::sync::Arc;

use crate::{
    domain::{ChatId, NotificationEvent},
    errors::Error,
    formatting::{escape_html, NotificationFormatter},
    messaging::port::MessagingPort,
    Result,
};

/// Turns detected events into chat messages.
///
/// Delivery is at-most-once: a failed send is reported to the caller and never
/// re-queued.
#[derive(Clone)]
pub struct Dispatcher {
    messenger: Arc<dyn MessagingPort>,
    chat_id: ChatId,
    formatter: NotificationFormatter,
}

impl Dispatcher {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        chat_id: ChatId,
        formatter: NotificationFormatter,
    ) -> Self {
        Self {
            messenger,
            chat_id,
            formatter,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// Send one event. HTML first, plain text if the HTML send is rejected.
    pub async fn deliver(&self, event: &NotificationEvent) -> Result<()> {
        let html = self.formatter.html(event);
        let html_err = match self.messenger.send_html(self.chat_id, &html).await {
            Ok(_) => {
                tracing::info!(id = %event.id, "notification delivered");
                return Ok(());
            }
            Err(e) => e,
        };

        tracing::warn!(id = %event.id, "html delivery failed, retrying as plain text: {html_err}");
        let plain = self.formatter.plain(event);
        match self.messenger.send_text(self.chat_id, &plain).await {
            Ok(_) => {
                tracing::info!(id = %event.id, "notification delivered as plain text");
                Ok(())
            }
            Err(e) => Err(Error::Delivery(format!("notification {}: {e}", event.id))),
        }
    }

    /// One-off operator message (used for the fatal authentication stop).
    pub async fn notify_operator(&self, text: &str) -> Result<()> {
        self.messenger
            .send_html(self.chat_id, &escape_html(text))
            .await
            .map(|_| ())
            .map_err(|e| Error::Delivery(e.to_string()))
    }
}
