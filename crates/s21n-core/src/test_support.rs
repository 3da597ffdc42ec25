//! In-crate fakes for the platform and messaging ports.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    domain::{Campus, ChatId, Credentials, MessageId, MessageRef, NotificationEvent},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    ports::{AuthToken, PlatformApi},
    Result,
};

/// Scripted platform. Unscripted calls succeed (fresh token / empty list).
#[derive(Default)]
pub struct FakePlatform {
    auth: Mutex<VecDeque<Result<AuthToken>>>,
    notifications: Mutex<VecDeque<Result<Vec<NotificationEvent>>>>,
    tokens_seen: Mutex<Vec<String>>,
    auth_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    token_ttl: Option<Duration>,
}

impl FakePlatform {
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = Some(ttl);
        self
    }

    pub async fn push_auth(&self, r: Result<AuthToken>) {
        self.auth.lock().await.push_back(r);
    }

    pub async fn push_fetch(&self, r: Result<Vec<NotificationEvent>>) {
        self.notifications.lock().await.push_back(r);
    }

    pub async fn push_events(&self, ids: &[&str]) {
        let events = ids
            .iter()
            .map(|id| NotificationEvent::new(*id, format!("event {id}"), "2026-01-01T00:00:00Z"))
            .collect();
        self.push_fetch(Ok(events)).await;
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Tokens used by notification fetches, in call order.
    pub async fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().await.clone()
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<AuthToken> {
        let n = self.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.auth.lock().await.pop_front() {
            Some(r) => r,
            None => Ok(AuthToken {
                access_token: format!("token-{n}"),
                expires_in: self.token_ttl,
            }),
        }
    }

    async fn list_campuses(&self, _token: &str) -> Result<Vec<Campus>> {
        Ok(vec![Campus {
            id: "c1".to_string(),
            name: "Moscow".to_string(),
        }])
    }

    async fn list_notifications(
        &self,
        token: &str,
        _campus: &Campus,
        _limit: u32,
    ) -> Result<Vec<NotificationEvent>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().await.push(token.to_string());
        self.notifications
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Clone, Debug)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub html: bool,
}

/// Messenger that records successful sends and can be told to fail.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    fail_html: AtomicBool,
    fail_text: AtomicBool,
}

impl RecordingMessenger {
    pub fn fail_html(&self, fail: bool) {
        self.fail_html.store(fail, Ordering::SeqCst);
    }

    pub fn fail_text(&self, fail: bool) {
        self.fail_text.store(fail, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    async fn record(&self, chat_id: ChatId, text: &str, html: bool) -> Result<MessageRef> {
        let mut sent = self.sent.lock().await;
        sent.push(SentMessage {
            chat_id,
            text: text.to_string(),
            html,
        });
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(sent.len() as i32),
        })
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        if self.fail_html.load(Ordering::SeqCst) {
            return Err(Error::External("telegram error: can't parse entities".to_string()));
        }
        self.record(chat_id, html, true).await
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        if self.fail_text.load(Ordering::SeqCst) {
            return Err(Error::External("telegram error: retry after 30s".to_string()));
        }
        self.record(chat_id, text, false).await
    }

    async fn delete_message(&self, _msg: MessageRef) -> Result<()> {
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        _keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.record(chat_id, text, true).await
    }

    async fn answer_callback_query(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }
}
