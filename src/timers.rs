//! Timer engine: at most one running countdown per user.
//!
//! Starting a new timer atomically replaces any running one. Expiry commits
//! through the session map under its lock, so a cancel (or replacement) that
//! already removed the session guarantees a racing expiry records nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::TimerConfig;
use crate::errors::CoreError;
use crate::keyboards;
use crate::replies;
use crate::slots::MessageSlotTracker;
use crate::traits::StateStore;
use crate::types::{event, tag, ChatId, UserId};

struct TimerSession {
    chat_id: ChatId,
    minutes: u32,
    /// Monotonic id distinguishing this session from a replacement for the
    /// same user. The expiry handler commits only if the live session still
    /// carries its generation.
    generation: u64,
    cancel: CancellationToken,
}

pub struct TimerEngine {
    state: Arc<dyn StateStore>,
    slots: Arc<MessageSlotTracker>,
    sessions: Mutex<HashMap<UserId, TimerSession>>,
    next_generation: AtomicU64,
    min_minutes: u32,
    max_minutes: u32,
}

impl TimerEngine {
    pub fn new(
        state: Arc<dyn StateStore>,
        slots: Arc<MessageSlotTracker>,
        config: &TimerConfig,
    ) -> Self {
        Self {
            state,
            slots,
            sessions: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            min_minutes: config.min_minutes,
            max_minutes: config.max_minutes,
        }
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.min_minutes, self.max_minutes)
    }

    pub fn is_running(&self, user_id: UserId) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&user_id)
    }

    /// Start a countdown, replacing any running session for this user.
    /// Returns immediately; the countdown runs as a spawned task.
    pub async fn start(
        self: &Arc<Self>,
        user_id: UserId,
        chat_id: ChatId,
        minutes: i64,
    ) -> Result<(), CoreError> {
        if minutes < self.min_minutes as i64 || minutes > self.max_minutes as i64 {
            return Err(CoreError::InvalidDuration {
                min: self.min_minutes,
                max: self.max_minutes,
            });
        }
        let minutes = minutes as u32;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let replaced = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.insert(
                user_id,
                TimerSession {
                    chat_id,
                    minutes,
                    generation,
                    cancel: cancel.clone(),
                },
            )
        };
        // Ledger writes are warn-and-continue, like the expiry path: once
        // the session is in the map the countdown must run, or a failed
        // append would strand a session no task ever finishes.
        if let Some(prev) = replaced {
            prev.cancel.cancel();
            if let Err(e) = self
                .state
                .append_event(user_id, event::TIMER_CANCEL, None)
                .await
            {
                warn!(user_id, error = %e, "Failed to record timer replacement");
            }
        }

        if let Err(e) = self
            .state
            .append_event(user_id, event::TIMER_START, Some(minutes as f64))
            .await
        {
            warn!(user_id, error = %e, "Failed to record timer start");
        }
        info!(user_id, minutes, "Timer started");

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let deadline = Duration::from_secs(minutes as u64 * 60);
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    engine.finish(user_id, chat_id, minutes, generation).await;
                }
            }
        });

        // The running-timer card replaces any previous card, including an
        // older timer's.
        if let Err(e) = self
            .slots
            .send(
                chat_id,
                user_id,
                &replies::timer_started_text(minutes),
                Some(keyboards::timer_running()),
                Some(tag::TIMER),
                &[],
            )
            .await
        {
            warn!(user_id, error = %e, "Failed to send timer card");
        }

        Ok(())
    }

    /// Cancel the user's running timer. Idempotent: no session is a no-op.
    pub async fn cancel(&self, user_id: UserId) -> anyhow::Result<()> {
        let removed = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.remove(&user_id)
        };
        if let Some(session) = removed {
            session.cancel.cancel();
            self.state
                .append_event(user_id, event::TIMER_CANCEL, None)
                .await?;
            self.slots
                .clear_tagged(session.chat_id, user_id, tag::TIMER)
                .await;
            info!(user_id, "Timer cancelled");
        }
        Ok(())
    }

    /// Expiry path. Commits only if this generation is still the live
    /// session; a session removed by cancel/replacement makes this a no-op.
    async fn finish(&self, user_id: UserId, chat_id: ChatId, minutes: u32, generation: u64) {
        let committed = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            match sessions.get(&user_id) {
                Some(live) if live.generation == generation => {
                    sessions.remove(&user_id);
                    true
                }
                _ => false,
            }
        };
        if !committed {
            return;
        }

        if let Err(e) = self
            .state
            .append_event(user_id, event::TIMER_DONE, Some(minutes as f64))
            .await
        {
            warn!(user_id, error = %e, "Failed to record timer completion");
        }
        info!(user_id, minutes, "Timer finished");

        self.slots.clear_tagged(chat_id, user_id, tag::TIMER).await;

        // Best-effort: a missed notification is not state-corrupting.
        if let Err(e) = self
            .slots
            .send(
                chat_id,
                user_id,
                &replies::timer_done_text(minutes),
                Some(keyboards::post_timer(minutes)),
                Some(tag::POST_TIMER),
                &[],
            )
            .await
        {
            warn!(user_id, error = %e, "Failed to deliver time's-up prompt");
        }
    }

    #[cfg(test)]
    fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}
