use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::Mutex;

use s21n_core::messaging::throttled::{ThrottledMessenger, DEFAULT_CHAT_INTERVAL};
use s21n_core::{
    config::Config,
    dispatcher::Dispatcher as NotificationDispatcher,
    domain::{Campus, Credentials},
    fetcher::NotificationFetcher,
    formatting::{escape_html, NotificationFormatter},
    messaging::port::MessagingPort,
    monitor::Monitor,
    poll::PollLoop,
    ports::PlatformApi,
    session::SessionManager,
    settings::SettingsStore,
};

use crate::handlers;
use crate::TelegramMessenger;

/// Shared state handed to every update handler.
pub struct AppState {
    pub cfg: Arc<Config>,
    pub settings: Mutex<SettingsStore>,
    pub platform: Arc<dyn PlatformApi>,
    pub messenger: Arc<dyn MessagingPort>,
    pub monitor: Monitor,
    /// Last campus list shown in the picker, used to resolve callback ids to names.
    pub campuses: Mutex<Vec<Campus>>,
}

impl AppState {
    pub fn new(
        cfg: Arc<Config>,
        settings: SettingsStore,
        platform: Arc<dyn PlatformApi>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            cfg,
            settings: Mutex::new(settings),
            platform,
            messenger,
            monitor: Monitor::new(),
            campuses: Mutex::new(Vec::new()),
        }
    }

    pub async fn credentials(&self) -> Option<Credentials> {
        self.settings.lock().await.credentials()
    }

    fn message_limit(&self) -> usize {
        self.messenger
            .capabilities()
            .max_message_len
            .min(self.cfg.telegram_message_limit)
    }

    /// Formatter for the current timezone setting.
    pub async fn formatter(&self) -> NotificationFormatter {
        let zone = self.settings.lock().await.settings().zone();
        NotificationFormatter::new(zone, self.message_limit())
    }

    /// Assemble a fresh poll loop from the current settings.
    ///
    /// Returns the names of the missing settings when monitoring cannot start.
    pub async fn build_poll_loop(&self) -> std::result::Result<PollLoop, Vec<&'static str>> {
        let store = self.settings.lock().await;
        let settings = store.settings();
        let (Some(credentials), Some(campus), Some(admin_chat)) =
            (store.credentials(), settings.campus(), settings.admin_chat())
        else {
            return Err(store.missing());
        };

        let formatter = NotificationFormatter::new(settings.zone(), self.message_limit());
        Ok(PollLoop::new(
            campus,
            self.cfg.poll_interval,
            SessionManager::new(self.platform.clone(), credentials),
            NotificationFetcher::new(self.platform.clone(), self.cfg.notifications_limit),
            NotificationDispatcher::new(self.messenger.clone(), admin_chat, formatter),
        ))
    }

    /// Start (or restart) monitoring with the current settings.
    pub async fn start_monitoring(&self) -> std::result::Result<Campus, Vec<&'static str>> {
        let poll = self.build_poll_loop().await?;
        let campus = poll.campus().clone();
        self.monitor.start(poll).await;
        Ok(campus)
    }

    /// Restart a running loop so it picks up changed settings.
    ///
    /// Returns whether a restart happened.
    pub async fn restart_if_running(&self) -> bool {
        if !self.monitor.is_running().await {
            return false;
        }
        match self.start_monitoring().await {
            Ok(campus) => {
                tracing::info!(campus = %campus.name, "monitoring restarted after settings change");
                true
            }
            Err(missing) => {
                tracing::warn!(?missing, "settings incomplete, keeping the running loop");
                false
            }
        }
    }
}

pub async fn run_polling(cfg: Arc<Config>, platform: Arc<dyn PlatformApi>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(bot = %me.username(), "bot started"),
        Err(e) => tracing::warn!("get_me failed: {e}"),
    }

    // 429 RetryAfter is still retried once in the Telegram adapter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> =
        Arc::new(ThrottledMessenger::new(raw_messenger, DEFAULT_CHAT_INTERVAL));

    let settings = SettingsStore::load(&cfg);
    let state = Arc::new(AppState::new(cfg.clone(), settings, platform, messenger));

    resume_monitoring(&state).await;

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state.clone()])
        .build()
        .dispatch()
        .await;

    state.monitor.stop().await;
    tracing::info!("bot stopped");
    Ok(())
}

/// Start monitoring on boot when the saved settings are complete.
pub async fn resume_monitoring(state: &AppState) -> bool {
    let campus = match state.start_monitoring().await {
        Ok(campus) => campus,
        Err(missing) => {
            tracing::info!(?missing, "monitoring not started, settings incomplete");
            return false;
        }
    };

    let admin_chat = state.settings.lock().await.settings().admin_chat();
    if let Some(chat_id) = admin_chat {
        let msg = format!(
            "🚀 Bot restarted. Monitoring <b>{}</b> again.",
            escape_html(&campus.name)
        );
        if let Err(e) = state.messenger.send_html(chat_id, &msg).await {
            tracing::warn!("startup notice failed: {e}");
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use s21n_core::{domain::ChatId, poll::PollState};

    use crate::testing::harness;

    #[tokio::test]
    async fn incomplete_settings_do_not_start_monitoring() {
        let h = harness("router-incomplete", &[("PLATFORM_LOGIN", "student")]);
        let missing = h.state.build_poll_loop().await.err().unwrap();
        assert_eq!(missing, vec!["password", "campus", "admin chat"]);
        assert!(!super::resume_monitoring(&h.state).await);
        assert!(!h.state.restart_if_running().await);
    }

    #[tokio::test]
    async fn formatter_respects_the_tighter_message_limit() {
        let h = harness("router-limit", &[]);
        assert_eq!(h.state.formatter().await.max_body_chars, 4096 - 300);

        let h = harness("router-limit-env", &[("TELEGRAM_MESSAGE_LIMIT", "1000")]);
        let f = h.state.formatter().await;
        assert_eq!(f.max_body_chars, 700);
        assert_eq!(f.zone.label(), "UTC+3");
    }

    #[tokio::test]
    async fn complete_settings_resume_on_boot() {
        let h = harness(
            "router-resume",
            &[
                ("PLATFORM_LOGIN", "student"),
                ("PLATFORM_PASSWORD", "pw"),
                ("ADMIN_CHAT_ID", "77"),
            ],
        );
        h.state
            .settings
            .lock()
            .await
            .set_campus(&s21n_core::domain::Campus {
                id: "c-msk".to_string(),
                name: "21 School Moscow".to_string(),
            })
            .unwrap();

        assert!(super::resume_monitoring(&h.state).await);
        assert!(h.state.monitor.is_running().await);
        assert!(h
            .messenger
            .last_text(ChatId(77))
            .await
            .contains("Monitoring <b>21 School Moscow</b> again"));

        assert!(h.state.restart_if_running().await);
        let snap = h.state.monitor.status().await.unwrap();
        assert_ne!(snap.state, PollState::Stopped);
        h.state.monitor.stop().await;
    }
}
