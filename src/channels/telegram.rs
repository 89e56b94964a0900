//! Telegram front-end: the concrete `Transport` over the Bot API plus the
//! long-polling dispatcher that feeds updates into the router.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    BotCommand, ChatAction, InlineKeyboardButton, InlineKeyboardMarkup,
    MaybeInaccessibleMessage, MessageId,
};
use tracing::{debug, info};

use crate::router::Router;
use crate::traits::Transport;
use crate::types::{ChatId as Chat, Keyboard, MsgId};

fn render_keyboard(keyboard: Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.into_iter().map(|row| {
        row.into_iter()
            .map(|b| InlineKeyboardButton::callback(b.label, b.data))
            .collect::<Vec<_>>()
    }))
}

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, chat_id: Chat, text: &str, keyboard: Option<Keyboard>) -> anyhow::Result<MsgId> {
        let request = self.bot.send_message(ChatId(chat_id), text);
        let message = match keyboard {
            Some(kb) => request.reply_markup(render_keyboard(kb)).await?,
            None => request.await?,
        };
        Ok(message.id.0)
    }

    async fn edit(
        &self,
        chat_id: Chat,
        message_id: MsgId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> anyhow::Result<()> {
        let request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text);
        match keyboard {
            Some(kb) => request.reply_markup(render_keyboard(kb)).await?,
            None => request.await?,
        };
        Ok(())
    }

    async fn delete(&self, chat_id: Chat, message_id: MsgId) -> anyhow::Result<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn typing(&self, chat_id: Chat) {
        if let Err(e) = self
            .bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
        {
            debug!(chat_id, error = %e, "Failed to send typing action");
        }
    }
}

/// Command menu shown by the Telegram client. Every command here must have
/// a matching arm in the router.
fn bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Restart onboarding"),
        BotCommand::new("menu", "Main menu"),
        BotCommand::new("stats", "Your focus stats"),
        BotCommand::new("usage", "AI usage and limits"),
        BotCommand::new("help", "What I can do"),
    ]
}

pub struct TelegramChannel {
    bot: Bot,
    router: Arc<Router>,
}

impl TelegramChannel {
    pub fn new(bot: Bot, router: Arc<Router>) -> Self {
        Self { bot, router }
    }

    /// Register the command menu and run the long-polling dispatcher until
    /// shutdown.
    pub async fn start(self) {
        if let Err(e) = self.bot.set_my_commands(bot_commands()).await {
            debug!(error = %e, "Failed to register bot commands");
        }

        info!("Starting Telegram channel");

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint({
                let router = Arc::clone(&self.router);
                move |msg: Message, bot: Bot| {
                    let router = Arc::clone(&router);
                    async move {
                        handle_message(&router, &bot, msg).await;
                        respond(())
                    }
                }
            }))
            .branch(Update::filter_callback_query().endpoint({
                let router = Arc::clone(&self.router);
                move |q: CallbackQuery, bot: Bot| {
                    let router = Arc::clone(&router);
                    async move {
                        handle_callback(&router, &bot, q).await;
                        respond(())
                    }
                }
            }));

        Dispatcher::builder(self.bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }
}

async fn handle_message(router: &Router, bot: &Bot, msg: Message) {
    let user_id = match msg.from.as_ref() {
        Some(user) => user.id.0 as i64,
        None => return,
    };
    let chat_id = msg.chat.id.0;
    let text = match msg.text() {
        Some(t) => t.trim(),
        None => return,
    };
    if text.is_empty() {
        return;
    }

    if let Some(rest) = text.strip_prefix('/') {
        // Commands are consumed and removed to keep the chat single-threaded.
        if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
            debug!(chat_id, error = %e, "Failed to delete command message");
        }
        // Strip arguments and the @botname suffix of group-style commands.
        let name = rest
            .split_whitespace()
            .next()
            .unwrap_or("")
            .split('@')
            .next()
            .unwrap_or("");
        router
            .handle_command(chat_id, user_id, &format!("/{}", name))
            .await;
        return;
    }

    router.handle_text(chat_id, user_id, text).await;
}

async fn handle_callback(router: &Router, bot: &Bot, q: CallbackQuery) {
    // Acknowledge immediately so the button stops spinning.
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        debug!(error = %e, "Failed to answer callback query");
    }

    let data = match q.data.as_deref() {
        Some(d) => d,
        None => return,
    };
    let user_id = q.from.id.0 as i64;

    let (chat_id, message_id) = match q.message {
        Some(MaybeInaccessibleMessage::Regular(m)) => (m.chat.id.0, Some(m.id.0)),
        Some(MaybeInaccessibleMessage::Inaccessible(m)) => (m.chat.id.0, None),
        // Private chat id equals the user id.
        None => (user_id, None),
    };

    router
        .handle_callback(chat_id, user_id, message_id, data)
        .await;
}
