use chrono::Local;

use s21n_core::{
    dispatcher::Dispatcher,
    domain::{ChatId, Credentials, MessageRef},
    errors::Error,
    fetcher::NotificationFetcher,
    formatting::escape_html,
    messaging::types::InlineKeyboard,
    poll::PollSnapshot,
    session::{Session, SessionManager},
    utils::human_timestamp,
    Result,
};

use crate::router::AppState;

const CAMPUS_BUTTONS_PER_ROW: usize = 2;
const TIMEZONE_BUTTONS_PER_ROW: usize = 2;

/// Zones offered by the `/timezone` picker: `(IANA name, button label)`.
pub(crate) const TIMEZONE_CHOICES: &[(&str, &str)] = &[
    ("Europe/Kaliningrad", "Kaliningrad (UTC+2)"),
    ("Europe/Moscow", "Moscow (UTC+3)"),
    ("Europe/Samara", "Samara (UTC+4)"),
    ("Asia/Tashkent", "Tashkent (UTC+5)"),
    ("Asia/Yekaterinburg", "Yekaterinburg (UTC+5)"),
    ("Asia/Omsk", "Omsk (UTC+6)"),
    ("Asia/Novosibirsk", "Novosibirsk (UTC+7)"),
    ("Asia/Novokuznetsk", "Novokuznetsk (UTC+7)"),
    ("Asia/Krasnoyarsk", "Krasnoyarsk (UTC+7)"),
    ("Asia/Irkutsk", "Irkutsk (UTC+8)"),
    ("Asia/Chita", "Chita (UTC+9)"),
    ("Asia/Vladivostok", "Vladivostok (UTC+10)"),
    ("Asia/Magadan", "Magadan (UTC+11)"),
    ("Asia/Sakhalin", "Sakhalin (UTC+11)"),
    ("Asia/Kamchatka", "Kamchatka (UTC+12)"),
    ("Asia/Anadyr", "Anadyr (UTC+12)"),
];

pub(crate) fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        return format!("{hours}h {mins}m {secs}s");
    }
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}

pub(crate) async fn reply(state: &AppState, chat_id: ChatId, html: &str) {
    if let Err(e) = state.messenger.send_html(chat_id, html).await {
        tracing::warn!(chat_id = chat_id.0, "reply failed: {e}");
    }
}

fn describe_error(e: &Error) -> String {
    match e {
        Error::Auth(reason) => format!(
            "❌ The platform rejected the login or password: {}",
            escape_html(reason)
        ),
        Error::AuthExpired => "⚠️ The platform session expired, try again.".to_string(),
        Error::Transient(reason) => format!(
            "⚠️ The platform is unavailable right now: <code>{}</code>",
            escape_html(reason)
        ),
        other => format!("❌ Error: <code>{}</code>", escape_html(&other.to_string())),
    }
}

async fn open_session(state: &AppState, credentials: Credentials) -> Result<Session> {
    SessionManager::new(state.platform.clone(), credentials)
        .ensure_valid_session()
        .await
}

pub(crate) async fn run_command(state: &AppState, msg: MessageRef, cmd: &str, arg: &str) {
    let chat_id = msg.chat_id;
    tracing::debug!(chat_id = chat_id.0, command = %cmd, "command");

    match cmd {
        "start" | "help" => cmd_start(state, chat_id).await,
        "login" => cmd_login(state, chat_id, arg).await,
        "password" => cmd_password(state, msg, arg).await,
        "campus" => cmd_campus(state, chat_id).await,
        "timezone" => cmd_timezone(state, chat_id, arg).await,
        "settings" => cmd_settings(state, chat_id).await,
        "status" => cmd_status(state, chat_id).await,
        "monitor" => cmd_monitor(state, chat_id).await,
        "stop" => cmd_stop(state, chat_id).await,
        "testauth" => cmd_testauth(state, chat_id).await,
        "last" => cmd_last(state, chat_id).await,
        "reset" => cmd_reset(state, chat_id).await,
        _ => {
            let msg = format!(
                "Unknown command: /{}\nUse /help to see the available commands.",
                escape_html(cmd)
            );
            reply(state, chat_id, &msg).await
        }
    }
}

async fn cmd_start(state: &AppState, chat_id: ChatId) {
    let bound_now = {
        let mut store = state.settings.lock().await;
        if store.settings().admin_chat_id.is_none() {
            if let Err(e) = store.set_admin_chat(chat_id) {
                drop(store);
                reply(state, chat_id, &describe_error(&e)).await;
                return;
            }
            tracing::info!(chat_id = chat_id.0, "admin chat bound");
            true
        } else {
            false
        }
    };

    let status = if state.monitor.is_running().await {
        "🟢 Monitoring is running"
    } else {
        "⚪ Monitoring is stopped"
    };
    let missing = state.settings.lock().await.missing();

    let mut body = String::from("🔔 <b>School Notifier</b>\n\n");
    if bound_now {
        body.push_str("✅ This chat is now the admin chat.\n\n");
    }
    body.push_str(&format!("Status: {status}\n"));
    if !missing.is_empty() {
        body.push_str(&format!("Still to set up: {}\n", missing.join(", ")));
    }
    body.push_str(
        "\n<b>📋 Commands:</b>\n\
/login &lt;login&gt; - Set the platform login\n\
/password &lt;password&gt; - Set the platform password (message is deleted)\n\
/campus - Choose your campus\n\
/timezone [tz] - Pick the display timezone, or set one, e.g. Asia/Omsk\n\
/settings - Show current settings\n\
/testauth - Check the login against the platform\n\
/monitor - Start monitoring\n\
/stop - Stop monitoring\n\
/status - Monitoring statistics\n\
/last - Show the latest notification\n\
/reset - Forget login, password and campus\n\
/help - Show this message",
    );

    reply(state, chat_id, &body).await;
}

async fn cmd_login(state: &AppState, chat_id: ChatId, arg: &str) {
    let login = arg.trim();
    if login.is_empty() || login.contains(char::is_whitespace) {
        reply(state, chat_id, "Usage: /login &lt;platform login&gt;").await;
        return;
    }

    if let Err(e) = state.settings.lock().await.set_login(login) {
        reply(state, chat_id, &describe_error(&e)).await;
        return;
    }

    let mut msg = format!("✅ Login set to <code>{}</code>.", escape_html(login));
    if state.restart_if_running().await {
        msg.push_str("\n🔄 Monitoring restarted with the new login.");
    }
    reply(state, chat_id, &msg).await;
}

async fn cmd_password(state: &AppState, msg: MessageRef, arg: &str) {
    let chat_id = msg.chat_id;

    // The command text carries the secret; remove it from the chat history.
    if let Err(e) = state.messenger.delete_message(msg).await {
        tracing::warn!("could not delete password message: {e}");
    }

    let password = arg.trim();
    if password.is_empty() {
        reply(state, chat_id, "Usage: /password &lt;platform password&gt;").await;
        return;
    }

    state.settings.lock().await.set_password(password);

    let mut text =
        "✅ Password saved in memory (it is never written to disk). The message was deleted."
            .to_string();
    if state.restart_if_running().await {
        text.push_str("\n🔄 Monitoring restarted with the new password.");
    }
    reply(state, chat_id, &text).await;
}

async fn cmd_campus(state: &AppState, chat_id: ChatId) {
    let Some(credentials) = state.credentials().await else {
        reply(state, chat_id, "Set /login and /password first.").await;
        return;
    };

    let campuses = match open_session(state, credentials).await {
        Ok(session) => state.platform.list_campuses(session.token()).await,
        Err(e) => Err(e),
    };
    let campuses = match campuses {
        Ok(c) => c,
        Err(e) => {
            reply(state, chat_id, &describe_error(&e)).await;
            return;
        }
    };
    if campuses.is_empty() {
        reply(state, chat_id, "The platform returned no campuses.").await;
        return;
    }

    let items: Vec<(String, String)> = campuses
        .iter()
        .map(|c| (c.name.clone(), format!("campus:{}", c.id)))
        .collect();
    let keyboard = InlineKeyboard::grid(
        &items,
        CAMPUS_BUTTONS_PER_ROW,
        state.cfg.button_label_max_length,
    );
    *state.campuses.lock().await = campuses;

    if let Err(e) = state
        .messenger
        .send_inline_keyboard(chat_id, "🏫 Choose your campus:", keyboard)
        .await
    {
        tracing::warn!("campus picker failed: {e}");
    }
}

async fn cmd_timezone(state: &AppState, chat_id: ChatId, arg: &str) {
    if !arg.trim().is_empty() {
        apply_timezone(state, chat_id, arg).await;
        return;
    }

    let current = state.settings.lock().await.settings().zone().label();
    let items: Vec<(String, String)> = TIMEZONE_CHOICES
        .iter()
        .map(|(zone, label)| (label.to_string(), format!("tz:{zone}")))
        .collect();
    let keyboard = InlineKeyboard::grid(
        &items,
        TIMEZONE_BUTTONS_PER_ROW,
        state.cfg.button_label_max_length,
    );
    let text = format!(
        "🕐 Current timezone: {current}\nChoose yours, or send /timezone Europe/Moscow or /timezone UTC+3."
    );
    if let Err(e) = state
        .messenger
        .send_inline_keyboard(chat_id, &text, keyboard)
        .await
    {
        tracing::warn!("timezone picker failed: {e}");
    }
}

/// Store `raw` as the display timezone and report back. Returns whether it was accepted.
pub(crate) async fn apply_timezone(state: &AppState, chat_id: ChatId, raw: &str) -> bool {
    let result = state.settings.lock().await.set_timezone(raw);
    match result {
        Ok(zone) => {
            tracing::info!(timezone = %zone.label(), "timezone changed");
            let mut msg = format!("✅ Timezone set to <b>{}</b>.", escape_html(&zone.label()));
            if state.restart_if_running().await {
                msg.push_str("\n🔄 Monitoring restarted.");
            }
            reply(state, chat_id, &msg).await;
            true
        }
        Err(Error::Config(_)) => {
            let msg = format!(
                "❌ Unknown timezone <code>{}</code>. Examples: Europe/Moscow, UTC+3, UTC-4:30",
                escape_html(raw.trim())
            );
            reply(state, chat_id, &msg).await;
            false
        }
        Err(e) => {
            reply(state, chat_id, &describe_error(&e)).await;
            false
        }
    }
}

async fn cmd_settings(state: &AppState, chat_id: ChatId) {
    let (settings, has_password, missing) = {
        let store = state.settings.lock().await;
        (store.settings().clone(), store.has_password(), store.missing())
    };

    let not_set = "<i>not set</i>".to_string();
    let login = if settings.platform_login.is_empty() {
        not_set.clone()
    } else {
        format!("<code>{}</code>", escape_html(&settings.platform_login))
    };
    let campus = match settings.campus() {
        Some(c) => format!("{} (<code>{}</code>)", escape_html(&c.name), escape_html(&c.id)),
        None => not_set.clone(),
    };
    let admin = settings
        .admin_chat_id
        .map(|id| format!("<code>{id}</code>"))
        .unwrap_or_else(|| not_set.clone());

    let mut lines = vec![
        "⚙️ <b>Settings</b>\n".to_string(),
        format!("👤 Login: {login}"),
        format!(
            "🔑 Password: {}",
            if has_password { "set" } else { "<i>not set</i>" }
        ),
        format!("🏫 Campus: {campus}"),
        format!("🕐 Timezone: {}", settings.zone().label()),
        format!("💬 Admin chat: {admin}"),
        format!(
            "⏱ Check interval: {}",
            format_duration(state.cfg.poll_interval.as_secs() as i64)
        ),
    ];
    if let Some(updated) = &settings.last_update {
        lines.push(format!("📝 Last change: {}", escape_html(updated)));
    }
    if missing.is_empty() {
        lines.push("\n✅ Ready. Use /monitor to start.".to_string());
    } else {
        lines.push(format!("\n⚠️ Missing: {}", missing.join(", ")));
    }

    reply(state, chat_id, &lines.join("\n")).await;
}

fn format_status(snap: &PollSnapshot) -> String {
    let uptime = (Local::now() - snap.started_at).num_seconds();
    let mut lines = vec![
        "📊 <b>Monitoring Status</b>\n".to_string(),
        format!("State: {}", snap.state.label()),
        format!("🏫 Campus: <b>{}</b>", escape_html(&snap.campus.name)),
        format!(
            "⏱ Interval: {}",
            format_duration(snap.interval.as_secs() as i64)
        ),
        format!(
            "🚀 Started: {} ({} ago)",
            human_timestamp(snap.started_at),
            format_duration(uptime)
        ),
        format!(
            "🕐 Last check: {}",
            snap.last_check
                .map(human_timestamp)
                .unwrap_or_else(|| "never".to_string())
        ),
        format!("🔁 Checks: {} | Errors: {}", snap.checks, snap.tick_errors),
        format!(
            "📨 Sent: {} | Failed: {}",
            snap.delivered, snap.delivery_failures
        ),
        format!("👁 Known notifications: {}", snap.seen),
        format!("🔐 Logins: {}", snap.authentications),
    ];
    if let Some(err) = &snap.last_error {
        lines.push(format!("\n⚠️ Last error: <code>{}</code>", escape_html(err)));
    }
    lines.join("\n")
}

async fn cmd_status(state: &AppState, chat_id: ChatId) {
    match state.monitor.status().await {
        Some(snap) => reply(state, chat_id, &format_status(&snap)).await,
        None => {
            reply(
                state,
                chat_id,
                "⚪ Monitoring has not been started. Use /monitor.",
            )
            .await
        }
    }
}

async fn cmd_monitor(state: &AppState, chat_id: ChatId) {
    let was_running = state.monitor.is_running().await;
    match state.start_monitoring().await {
        Ok(campus) => {
            let verb = if was_running { "restarted" } else { "started" };
            let msg = format!(
                "▶️ Monitoring {verb} for <b>{}</b>.\nChecking every {}. Notifications already on the platform are not re-sent.",
                escape_html(&campus.name),
                format_duration(state.cfg.poll_interval.as_secs() as i64)
            );
            reply(state, chat_id, &msg).await
        }
        Err(missing) => {
            let msg = format!(
                "⚠️ Cannot start monitoring. Missing: {}",
                missing.join(", ")
            );
            reply(state, chat_id, &msg).await
        }
    }
}

async fn cmd_stop(state: &AppState, chat_id: ChatId) {
    if state.monitor.stop().await {
        tracing::info!("monitoring stopped by command");
        reply(state, chat_id, "⏹ Monitoring stopped.").await;
    } else {
        reply(state, chat_id, "Monitoring is not running.").await;
    }
}

async fn cmd_testauth(state: &AppState, chat_id: ChatId) {
    let Some(credentials) = state.credentials().await else {
        reply(state, chat_id, "Set /login and /password first.").await;
        return;
    };

    match state.platform.authenticate(&credentials).await {
        Ok(token) => {
            let prefix: String = token.access_token.chars().take(8).collect();
            let mut msg = format!(
                "✅ Authentication succeeded for <code>{}</code>.\nToken: <code>{}…</code>",
                escape_html(&credentials.login),
                escape_html(&prefix)
            );
            if let Some(ttl) = token.expires_in {
                msg.push_str(&format!(
                    "\nValid for: {}",
                    format_duration(ttl.as_secs() as i64)
                ));
            }
            reply(state, chat_id, &msg).await
        }
        Err(e) => reply(state, chat_id, &describe_error(&e)).await,
    }
}

async fn cmd_last(state: &AppState, chat_id: ChatId) {
    let (credentials, campus) = {
        let store = state.settings.lock().await;
        (store.credentials(), store.settings().campus())
    };
    let (Some(credentials), Some(campus)) = (credentials, campus) else {
        reply(state, chat_id, "Set /login, /password and /campus first.").await;
        return;
    };

    let fetcher = NotificationFetcher::new(state.platform.clone(), 1);
    let latest = match open_session(state, credentials).await {
        Ok(session) => fetcher.fetch_latest(&session, &campus).await,
        Err(e) => Err(e),
    };

    match latest {
        Ok(Some(event)) => {
            let dispatcher =
                Dispatcher::new(state.messenger.clone(), chat_id, state.formatter().await);
            if let Err(e) = dispatcher.deliver(&event).await {
                tracing::warn!("latest notification not delivered: {e}");
            }
        }
        Ok(None) => reply(state, chat_id, "📭 No notifications yet.").await,
        Err(e) => reply(state, chat_id, &describe_error(&e)).await,
    }
}

async fn cmd_reset(state: &AppState, chat_id: ChatId) {
    let stopped = state.monitor.stop().await;
    let result = state.settings.lock().await.reset();
    state.campuses.lock().await.clear();

    match result {
        Ok(()) => {
            let mut msg =
                "♻️ Login, password and campus cleared. Admin chat and timezone kept.".to_string();
            if stopped {
                msg.push_str("\n⏹ Monitoring stopped.");
            }
            reply(state, chat_id, &msg).await
        }
        Err(e) => reply(state, chat_id, &describe_error(&e)).await,
    }
}
