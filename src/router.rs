//! Transport-agnostic interaction routing: commands, inline-keyboard
//! callbacks, and free text. The Telegram channel feeds updates in here;
//! tests drive it directly with mocks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::errors::CoreError;
use crate::gate::UsageGate;
use crate::keyboards;
use crate::replies;
use crate::slots::MessageSlotTracker;
use crate::timers::TimerEngine;
use crate::traits::{StateStore, Transport};
use crate::types::{event, tag, ChatId, Keyboard, MsgId, UserId};

/// Tags whose messages survive unrelated sends. The running-timer card must
/// outlive menus and coach replies.
const PRESERVE: &[&str] = &[tag::TIMER];

/// What the next free-text message from a user is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingInput {
    CustomMinutes,
    Ask,
    Feedback,
}

pub struct Router {
    state: Arc<dyn StateStore>,
    transport: Arc<dyn Transport>,
    slots: Arc<MessageSlotTracker>,
    timers: Arc<TimerEngine>,
    gate: Arc<UsageGate>,
    admin_user_ids: Vec<UserId>,
    model_name: Option<String>,
    pending: Mutex<HashMap<UserId, PendingInput>>,
}

impl Router {
    pub fn new(
        state: Arc<dyn StateStore>,
        transport: Arc<dyn Transport>,
        slots: Arc<MessageSlotTracker>,
        timers: Arc<TimerEngine>,
        gate: Arc<UsageGate>,
        admin_user_ids: Vec<UserId>,
        model_name: Option<String>,
    ) -> Self {
        Self {
            state,
            transport,
            slots,
            timers,
            gate,
            admin_user_ids,
            model_name,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn set_pending(&self, user_id: UserId, input: Option<PendingInput>) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match input {
            Some(p) => {
                pending.insert(user_id, p);
            }
            None => {
                pending.remove(&user_id);
            }
        }
    }

    fn take_pending(&self, user_id: UserId) -> Option<PendingInput> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&user_id)
    }

    /// Send through the slot tracker, logging instead of propagating:
    /// a dropped card never interrupts the user flow.
    async fn reply(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        text: &str,
        keyboard: Option<Keyboard>,
        slot_tag: &str,
    ) {
        if let Err(e) = self
            .slots
            .send(chat_id, user_id, text, keyboard, Some(slot_tag), PRESERVE)
            .await
        {
            warn!(user_id, error = %e, "Failed to send reply");
        }
    }

    /// Edit the callback's own message in place when possible, otherwise
    /// fall back to a fresh slot send.
    async fn edit_or_reply(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        message_id: Option<MsgId>,
        text: &str,
        keyboard: Option<Keyboard>,
        slot_tag: &str,
    ) {
        if let Some(mid) = message_id {
            if self
                .transport
                .edit(chat_id, mid, text, keyboard.clone())
                .await
                .is_ok()
            {
                self.slots.retag(chat_id, user_id, Some(slot_tag)).await;
                return;
            }
        }
        self.reply(chat_id, user_id, text, keyboard, slot_tag).await;
    }

    pub async fn handle_command(&self, chat_id: ChatId, user_id: UserId, command: &str) {
        if let Err(e) = self.state.ensure_user(user_id).await {
            warn!(user_id, error = %e, "Failed to register user");
        }

        match command {
            "/start" => {
                if let Err(e) = self.state.append_event(user_id, event::START, None).await {
                    warn!(user_id, error = %e, "Failed to record start event");
                }
                self.set_pending(user_id, None);
                self.reply(
                    chat_id,
                    user_id,
                    replies::ONBOARDING_TEXT,
                    Some(keyboards::onboarding()),
                    tag::ONBOARDING,
                )
                .await;
            }
            "/menu" => {
                self.reply(
                    chat_id,
                    user_id,
                    replies::WELCOME_TEXT,
                    Some(keyboards::menu()),
                    tag::MENU,
                )
                .await;
            }
            "/help" => {
                self.reply(
                    chat_id,
                    user_id,
                    replies::HELP_TEXT,
                    Some(keyboards::menu()),
                    tag::HELP,
                )
                .await;
            }
            "/stats" => {
                match self.state.fetch_stats(user_id).await {
                    Ok(stats) => {
                        self.reply(
                            chat_id,
                            user_id,
                            &replies::stats_text(&stats),
                            Some(keyboards::menu()),
                            tag::STATS,
                        )
                        .await;
                    }
                    Err(e) => warn!(user_id, error = %e, "Failed to fetch stats"),
                }
            }
            "/usage" => match self.gate.snapshot(user_id).await {
                Ok(snapshot) => {
                    let text = replies::usage_status_text(
                        snapshot.enabled,
                        self.model_name.as_deref().unwrap_or("none"),
                        snapshot.calls_today,
                        snapshot.max_calls_per_day,
                        snapshot.spend_today,
                        snapshot.max_daily_spend_usd,
                    );
                    self.reply(chat_id, user_id, &text, Some(keyboards::menu()), tag::USAGE)
                        .await;
                }
                Err(e) => warn!(user_id, error = %e, "Failed to read usage snapshot"),
            },
            other => {
                info!(user_id, command = other, "Unknown command");
                self.reply(
                    chat_id,
                    user_id,
                    replies::WELCOME_TEXT,
                    Some(keyboards::menu()),
                    tag::MENU,
                )
                .await;
            }
        }
    }

    pub async fn handle_callback(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        message_id: Option<MsgId>,
        data: &str,
    ) {
        let mut parts = data.splitn(3, ':');
        let prefix = parts.next().unwrap_or("");
        let action = parts.next().unwrap_or("");
        let arg = parts.next().unwrap_or("");

        match (prefix, action) {
            ("ob", variant) => self.on_onboarding_choice(chat_id, user_id, message_id, variant).await,
            ("startnow", "start") => self.on_start_now(chat_id, user_id, message_id).await,
            ("menu", item) => self.on_menu(chat_id, user_id, message_id, item).await,
            ("timer", "custom") => {
                self.set_pending(user_id, Some(PendingInput::CustomMinutes));
                let (min, max) = self.timers.bounds();
                self.edit_or_reply(
                    chat_id,
                    user_id,
                    message_id,
                    &replies::custom_timer_prompt(min, max),
                    Some(keyboards::back_to_timers()),
                    tag::TIMER_MENU,
                )
                .await;
            }
            ("timer", "stop") => {
                if let Err(e) = self.timers.cancel(user_id).await {
                    warn!(user_id, error = %e, "Failed to cancel timer");
                }
                self.reply(
                    chat_id,
                    user_id,
                    replies::TIMER_STOPPED_TEXT,
                    Some(keyboards::menu()),
                    tag::MENU,
                )
                .await;
            }
            ("timer", minutes) => {
                let minutes: i64 = match minutes.parse() {
                    Ok(n) => n,
                    Err(_) => return,
                };
                self.start_timer(chat_id, user_id, minutes).await;
            }
            ("posttimer", outcome) => {
                let minutes: i64 = arg.parse().unwrap_or(0);
                self.on_post_timer(chat_id, user_id, message_id, outcome, minutes)
                    .await;
            }
            ("reason", code) => self.on_reason(chat_id, user_id, message_id, code).await,
            ("ask", _) => {
                self.set_pending(user_id, Some(PendingInput::Ask));
                self.edit_or_reply(
                    chat_id,
                    user_id,
                    message_id,
                    replies::ASK_PROMPT_TEXT,
                    Some(keyboards::menu()),
                    tag::ASK,
                )
                .await;
            }
            _ => info!(user_id, data, "Unknown callback"),
        }
    }

    pub async fn handle_text(&self, chat_id: ChatId, user_id: UserId, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        match self.take_pending(user_id) {
            Some(PendingInput::CustomMinutes) => {
                self.on_custom_minutes(chat_id, user_id, text).await;
            }
            Some(PendingInput::Ask) => {
                self.coach_reply(chat_id, user_id, text, 0.9).await;
            }
            Some(PendingInput::Feedback) => {
                self.on_feedback(chat_id, user_id, text).await;
            }
            None => {
                self.coach_reply(chat_id, user_id, text, 0.8).await;
            }
        }
    }

    async fn start_timer(&self, chat_id: ChatId, user_id: UserId, minutes: i64) {
        match self.timers.start(user_id, chat_id, minutes).await {
            Ok(()) => {}
            Err(CoreError::InvalidDuration { min, max }) => {
                self.reply(
                    chat_id,
                    user_id,
                    &replies::invalid_duration_text(min, max),
                    Some(keyboards::menu()),
                    tag::MENU,
                )
                .await;
            }
            Err(e) => warn!(user_id, error = %e, "Failed to start timer"),
        }
    }

    async fn on_custom_minutes(&self, chat_id: ChatId, user_id: UserId, text: &str) {
        let (min, max) = self.timers.bounds();
        let minutes: i64 = match text.parse() {
            Ok(n) => n,
            Err(_) => {
                // Not a number: keep waiting for one.
                self.set_pending(user_id, Some(PendingInput::CustomMinutes));
                self.reply(
                    chat_id,
                    user_id,
                    &replies::invalid_duration_text(min, max),
                    Some(keyboards::menu()),
                    tag::MENU,
                )
                .await;
                return;
            }
        };
        match self.timers.start(user_id, chat_id, minutes).await {
            Ok(()) => {}
            Err(CoreError::InvalidDuration { min, max }) => {
                self.set_pending(user_id, Some(PendingInput::CustomMinutes));
                self.reply(
                    chat_id,
                    user_id,
                    &replies::invalid_duration_text(min, max),
                    Some(keyboards::menu()),
                    tag::MENU,
                )
                .await;
            }
            Err(e) => warn!(user_id, error = %e, "Failed to start custom timer"),
        }
    }

    async fn on_onboarding_choice(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        message_id: Option<MsgId>,
        variant: &str,
    ) {
        if let Err(e) = self.state.ensure_user(user_id).await {
            warn!(user_id, error = %e, "Failed to register user");
        }
        if let Err(e) = self.state.set_personal_context(user_id, variant).await {
            warn!(user_id, error = %e, "Failed to store personal context");
        }
        self.edit_or_reply(
            chat_id,
            user_id,
            message_id,
            replies::onboarding_reply(variant),
            Some(keyboards::kick_timers()),
            tag::ONBOARDING,
        )
        .await;
    }

    async fn on_start_now(&self, chat_id: ChatId, user_id: UserId, message_id: Option<MsgId>) {
        let context = self
            .state
            .personal_context(user_id)
            .await
            .unwrap_or_default();
        let phrase = replies::kick_phrase(context.as_deref());
        self.edit_or_reply(
            chat_id,
            user_id,
            message_id,
            &format!("🚀 {}", phrase),
            Some(keyboards::kick_timers()),
            tag::START_NOW,
        )
        .await;
    }

    async fn on_menu(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        message_id: Option<MsgId>,
        item: &str,
    ) {
        match item {
            "root" => {
                self.edit_or_reply(
                    chat_id,
                    user_id,
                    message_id,
                    replies::WELCOME_TEXT,
                    Some(keyboards::menu()),
                    tag::MENU,
                )
                .await;
            }
            "help" => {
                self.edit_or_reply(
                    chat_id,
                    user_id,
                    message_id,
                    replies::HELP_TEXT,
                    Some(keyboards::menu()),
                    tag::HELP,
                )
                .await;
            }
            "stats" => match self.state.fetch_stats(user_id).await {
                Ok(stats) => {
                    self.edit_or_reply(
                        chat_id,
                        user_id,
                        message_id,
                        &replies::stats_text(&stats),
                        Some(keyboards::menu()),
                        tag::STATS,
                    )
                    .await;
                }
                Err(e) => warn!(user_id, error = %e, "Failed to fetch stats"),
            },
            "timer" => {
                self.edit_or_reply(
                    chat_id,
                    user_id,
                    message_id,
                    replies::TIMER_MENU_TEXT,
                    Some(keyboards::timers()),
                    tag::TIMER_MENU,
                )
                .await;
            }
            "feedback" => {
                self.set_pending(user_id, Some(PendingInput::Feedback));
                self.edit_or_reply(
                    chat_id,
                    user_id,
                    message_id,
                    replies::FEEDBACK_PROMPT_TEXT,
                    Some(keyboards::menu()),
                    tag::FEEDBACK,
                )
                .await;
            }
            other => info!(user_id, item = other, "Unknown menu item"),
        }
    }

    async fn on_post_timer(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        message_id: Option<MsgId>,
        outcome: &str,
        minutes: i64,
    ) {
        match outcome {
            "win" => {
                if let Err(e) = self
                    .state
                    .append_event(user_id, event::POSTTIMER_WIN, Some(minutes as f64))
                    .await
                {
                    warn!(user_id, error = %e, "Failed to record win");
                }
                let stats = self.state.fetch_stats(user_id).await.unwrap_or_default();
                self.edit_or_reply(
                    chat_id,
                    user_id,
                    message_id,
                    &replies::win_recorded_text(minutes.max(0) as u32, &stats),
                    Some(keyboards::menu()),
                    tag::MENU,
                )
                .await;
            }
            "fail" => {
                if let Err(e) = self
                    .state
                    .append_event(user_id, event::POSTTIMER_FAIL, Some(minutes as f64))
                    .await
                {
                    warn!(user_id, error = %e, "Failed to record miss");
                }
                self.edit_or_reply(
                    chat_id,
                    user_id,
                    message_id,
                    replies::FAIL_FOLLOWUP_TEXT,
                    Some(keyboards::reasons()),
                    tag::REASONS,
                )
                .await;
            }
            other => info!(user_id, outcome = other, "Unknown post-timer outcome"),
        }
    }

    async fn on_reason(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        message_id: Option<MsgId>,
        code: &str,
    ) {
        if let Err(e) = self
            .state
            .append_event(user_id, &format!("reason_{}", code), Some(1.0))
            .await
        {
            warn!(user_id, error = %e, "Failed to record reason");
        }

        let (text, suggested) = replies::reason_reply(code);
        let keyboard = match suggested {
            Some(minutes) => keyboards::suggested_timer(minutes),
            None => keyboards::menu(),
        };
        self.edit_or_reply(chat_id, user_id, message_id, text, Some(keyboard), tag::REASONS)
            .await;
    }

    /// Free text goes to the coach through the usage gate.
    async fn coach_reply(&self, chat_id: ChatId, user_id: UserId, text: &str, temperature: f32) {
        if let Err(e) = self.state.ensure_user(user_id).await {
            warn!(user_id, error = %e, "Failed to register user");
        }
        if let Err(e) = self.state.store_message(user_id, "free_chat", text).await {
            warn!(user_id, error = %e, "Failed to archive message");
        }
        if let Err(e) = self
            .state
            .append_event(user_id, event::FREE_CHAT, Some(1.0))
            .await
        {
            warn!(user_id, error = %e, "Failed to record free_chat event");
        }

        self.transport.typing(chat_id).await;

        let context = self
            .state
            .personal_context(user_id)
            .await
            .unwrap_or_default();
        let prompt = replies::coach_prompt(context.as_deref(), text);
        let reply = self.gate.try_generate(user_id, &prompt, temperature, 300).await;

        self.reply(chat_id, user_id, &reply, Some(keyboards::menu()), tag::COACH)
            .await;
    }

    async fn on_feedback(&self, chat_id: ChatId, user_id: UserId, text: &str) {
        if let Err(e) = self.state.store_message(user_id, "feedback", text).await {
            warn!(user_id, error = %e, "Failed to store feedback");
        }
        if let Err(e) = self
            .state
            .append_event(user_id, event::FEEDBACK, Some(1.0))
            .await
        {
            warn!(user_id, error = %e, "Failed to record feedback event");
        }

        for admin_id in &self.admin_user_ids {
            if let Err(e) = self
                .transport
                .send(*admin_id, &format!("🗣 Feedback from {}:\n{}", user_id, text), None)
                .await
            {
                warn!(admin_id, error = %e, "Failed to forward feedback");
            }
        }

        self.reply(
            chat_id,
            user_id,
            replies::FEEDBACK_THANKS_TEXT,
            Some(keyboards::menu()),
            tag::MENU,
        )
        .await;
    }
}
