use s21n_core::{
    domain::{Campus, ChatId},
    formatting::escape_html,
    security::is_authorized,
};

use crate::router::AppState;

use super::commands::{apply_timezone, reply};

async fn answer(state: &AppState, callback_id: &str, text: Option<&str>) {
    if let Err(e) = state.messenger.answer_callback_query(callback_id, text).await {
        tracing::warn!("answer_callback_query failed: {e}");
    }
}

/// Inline keyboard presses: `campus:{id}` and `tz:{zone}`.
pub(crate) async fn on_callback(
    state: &AppState,
    callback_id: &str,
    chat_id: Option<ChatId>,
    data: &str,
) {
    // Always answer callback query eventually.
    let Some(chat_id) = chat_id.filter(|_| !data.is_empty()) else {
        answer(state, callback_id, None).await;
        return;
    };

    let admin_chat = state.settings.lock().await.settings().admin_chat();
    if !is_authorized(admin_chat, chat_id) {
        answer(state, callback_id, Some("Unauthorized")).await;
        return;
    }

    if let Some(zone) = data.strip_prefix("tz:").filter(|z| !z.is_empty()) {
        on_timezone(state, callback_id, chat_id, zone).await;
        return;
    }
    let Some(campus_id) = data.strip_prefix("campus:").filter(|id| !id.is_empty()) else {
        answer(state, callback_id, None).await;
        return;
    };

    let campus = state
        .campuses
        .lock()
        .await
        .iter()
        .find(|c| c.id == campus_id)
        .cloned()
        .unwrap_or_else(|| Campus {
            id: campus_id.to_string(),
            name: campus_id.to_string(),
        });

    let saved = state.settings.lock().await.set_campus(&campus);
    if let Err(e) = saved {
        tracing::error!("failed to save campus: {e}");
        answer(state, callback_id, Some("Failed to save the campus")).await;
        return;
    }
    answer(state, callback_id, Some("Campus selected")).await;
    tracing::info!(campus = %campus.name, "campus selected");

    let mut msg = format!("✅ Campus set to <b>{}</b>.", escape_html(&campus.name));
    if state.restart_if_running().await {
        msg.push_str("\n🔄 Monitoring restarted for the new campus.");
    } else {
        let missing = state.settings.lock().await.missing();
        if missing.is_empty() {
            msg.push_str("\nUse /monitor to start monitoring.");
        }
    }
    reply(state, chat_id, &msg).await;
}

async fn on_timezone(state: &AppState, callback_id: &str, chat_id: ChatId, zone: &str) {
    // The reply message carries the outcome; the toast only acknowledges.
    answer(state, callback_id, None).await;
    apply_timezone(state, chat_id, zone).await;
}
