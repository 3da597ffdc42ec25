//! Telegram update handlers.
//!
//! Handlers are thin adapters: they pull the chat id and text out of the
//! update, check that the chat is the admin chat and reply through the
//! `MessagingPort` held in [`AppState`].

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use s21n_core::{
    domain::{ChatId, MessageId, MessageRef},
    security::{chat_access, ChatAccess},
};

use crate::router::AppState;

mod callback;
mod commands;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = q.message.as_ref().map(|m| ChatId(m.chat.id.0));
    let data = q.data.clone().unwrap_or_default();
    callback::on_callback(&state, &q.id, chat_id, &data).await;
    Ok(())
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let msg_ref = MessageRef {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
    };
    on_text(&state, msg_ref, text).await;
    Ok(())
}

pub(crate) async fn on_text(state: &AppState, msg: MessageRef, text: &str) {
    let chat_id = msg.chat_id;
    let admin_chat = state.settings.lock().await.settings().admin_chat();

    if !text.starts_with('/') {
        if chat_access(admin_chat, chat_id) == ChatAccess::Admin {
            commands::reply(state, chat_id, "Use /help to see the available commands.").await;
        }
        return;
    }

    let (cmd, arg) = commands::parse_command(text);
    match chat_access(admin_chat, chat_id) {
        ChatAccess::Admin => commands::run_command(state, msg, &cmd, &arg).await,
        ChatAccess::Unbound if cmd == "start" || cmd == "help" => {
            commands::run_command(state, msg, &cmd, &arg).await
        }
        ChatAccess::Unbound => {
            commands::reply(
                state,
                chat_id,
                "This bot is not bound to a chat yet. Send /start to make this chat the admin chat.",
            )
            .await
        }
        ChatAccess::Denied => {
            tracing::warn!(chat_id = chat_id.0, command = %cmd, "command from foreign chat rejected");
            if let Err(e) = state
                .messenger
                .send_text(chat_id, "Unauthorized. This bot serves a single admin chat.")
                .await
            {
                tracing::warn!("reply failed: {e}");
            }
        }
    }
}
