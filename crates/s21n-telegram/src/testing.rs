use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use s21n_core::{
    config::Config,
    domain::{Campus, ChatId, Credentials, MessageId, MessageRef, NotificationEvent},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    ports::{AuthToken, PlatformApi},
    settings::SettingsStore,
    Result,
};

use crate::router::AppState;

/// Platform stub with a fixed campus list and notification feed.
pub struct StubPlatform {
    pub reject_auth: AtomicBool,
    pub auth_calls: AtomicUsize,
    pub events: Mutex<Vec<NotificationEvent>>,
}

impl Default for StubPlatform {
    fn default() -> Self {
        Self {
            reject_auth: AtomicBool::new(false),
            auth_calls: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PlatformApi for StubPlatform {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<AuthToken> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_auth.load(Ordering::SeqCst) {
            return Err(Error::Auth("Invalid user credentials".to_string()));
        }
        Ok(AuthToken {
            access_token: "eyJhbGciOiJSUzI1NiJ9.secret-part".to_string(),
            expires_in: None,
        })
    }

    async fn list_campuses(&self, _token: &str) -> Result<Vec<Campus>> {
        Ok(vec![
            Campus {
                id: "c-msk".to_string(),
                name: "21 School Moscow".to_string(),
            },
            Campus {
                id: "c-kzn".to_string(),
                name: "21 School Kazan".to_string(),
            },
        ])
    }

    async fn list_notifications(
        &self,
        _token: &str,
        _campus: &Campus,
        limit: u32,
    ) -> Result<Vec<NotificationEvent>> {
        let events = self.events.lock().await;
        Ok(events.iter().take(limit as usize).cloned().collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outgoing {
    Html(ChatId, String),
    Text(ChatId, String),
    Keyboard(ChatId, String, InlineKeyboard),
    Deleted(MessageRef),
    CallbackAnswer(String, Option<String>),
}

#[derive(Default)]
pub struct StubMessenger {
    pub outgoing: Mutex<Vec<Outgoing>>,
}

impl StubMessenger {
    pub async fn all(&self) -> Vec<Outgoing> {
        self.outgoing.lock().await.clone()
    }

    /// Every message body sent to `chat`, in order.
    pub async fn texts_for(&self, chat: ChatId) -> Vec<String> {
        self.all()
            .await
            .into_iter()
            .filter_map(|o| match o {
                Outgoing::Html(c, t) | Outgoing::Text(c, t) | Outgoing::Keyboard(c, t, _)
                    if c == chat =>
                {
                    Some(t)
                }
                _ => None,
            })
            .collect()
    }

    pub async fn last_text(&self, chat: ChatId) -> String {
        self.texts_for(chat).await.pop().unwrap_or_default()
    }

    async fn push(&self, out: Outgoing) -> usize {
        let mut all = self.outgoing.lock().await;
        all.push(out);
        all.len()
    }
}

#[async_trait]
impl MessagingPort for StubMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let n = self.push(Outgoing::Html(chat_id, html.to_string())).await;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(n as i32),
        })
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let n = self.push(Outgoing::Text(chat_id, text.to_string())).await;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(n as i32),
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.push(Outgoing::Deleted(msg)).await;
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let n = self
            .push(Outgoing::Keyboard(chat_id, text.to_string(), keyboard))
            .await;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(n as i32),
        })
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.push(Outgoing::CallbackAnswer(
            callback_id.to_string(),
            text.map(str::to_string),
        ))
        .await;
        Ok(())
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub platform: Arc<StubPlatform>,
    pub messenger: Arc<StubMessenger>,
    dir: std::path::PathBuf,
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// App state over stubs, with settings in a per-test temp dir.
pub fn harness(name: &str, env: &[(&str, &str)]) -> Harness {
    let dir = std::env::temp_dir().join(format!("s21n-tg-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let file = dir.join("bot_config.json").display().to_string();

    let mut pairs: Vec<(String, String)> = vec![
        ("TELEGRAM_BOT_TOKEN".to_string(), "1:test".to_string()),
        ("SETTINGS_FILE".to_string(), file),
    ];
    pairs.extend(env.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    let cfg = Config::from_lookup(|k: &str| {
        pairs
            .iter()
            .find(|(pk, _)| pk == k)
            .map(|(_, v)| v.clone())
    })
    .unwrap();

    let platform = Arc::new(StubPlatform::default());
    let messenger = Arc::new(StubMessenger::default());
    let settings = SettingsStore::load(&cfg);
    let state = Arc::new(AppState::new(
        Arc::new(cfg),
        settings,
        platform.clone(),
        messenger.clone(),
    ));

    Harness {
        state,
        platform,
        messenger,
        dir,
    }
}
