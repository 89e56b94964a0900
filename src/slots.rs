//! Message slot tracker: keeps at most one live actionable bot message per
//! (chat, user) pair so the conversation stays single-threaded.
//!
//! Each send replaces the previously tracked message unless the old
//! message's tag is in the caller's `preserve_tags` (e.g. an active timer
//! card survives a coach reply). Preservation protects the message, not the
//! slot: the slot always tracks the newest message.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::traits::Transport;
use crate::types::{ChatId, Keyboard, MsgId, UserId};

#[derive(Debug, Clone)]
struct Slot {
    message_id: MsgId,
    tag: Option<String>,
}

pub struct MessageSlotTracker {
    transport: Arc<dyn Transport>,
    // The async mutex is held across the delete+send so two concurrent sends
    // for the same process can't both keep their predecessor alive.
    slots: Mutex<HashMap<(ChatId, UserId), Slot>>,
}

impl MessageSlotTracker {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Send a message, replacing the previous tracked one unless its tag is
    /// preserved. Deletion of the old message is best-effort.
    pub async fn send(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        text: &str,
        keyboard: Option<Keyboard>,
        tag: Option<&str>,
        preserve_tags: &[&str],
    ) -> anyhow::Result<MsgId> {
        let key = (chat_id, user_id);
        let mut slots = self.slots.lock().await;

        if let Some(prev) = slots.get(&key) {
            let preserved = prev
                .tag
                .as_deref()
                .map_or(false, |t| preserve_tags.contains(&t));
            if !preserved {
                if let Err(e) = self.transport.delete(chat_id, prev.message_id).await {
                    debug!(chat_id, message_id = prev.message_id, error = %e,
                        "Failed to delete previous bot message");
                }
            }
        }

        let message_id = self.transport.send(chat_id, text, keyboard).await?;
        slots.insert(
            key,
            Slot {
                message_id,
                tag: tag.map(str::to_string),
            },
        );
        Ok(message_id)
    }

    /// Update only the tag of the tracked slot, e.g. after an in-place edit.
    /// No-op when nothing is tracked.
    pub async fn retag(&self, chat_id: ChatId, user_id: UserId, tag: Option<&str>) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(&(chat_id, user_id)) {
            slot.tag = tag.map(str::to_string);
        }
    }

    /// Drop and delete the tracked message only if its tag matches. Used by
    /// timer expiry/cancel to clear the running-timer card without touching
    /// an unrelated newer message.
    pub async fn clear_tagged(&self, chat_id: ChatId, user_id: UserId, tag: &str) {
        let removed = {
            let mut slots = self.slots.lock().await;
            match slots.get(&(chat_id, user_id)) {
                Some(slot) if slot.tag.as_deref() == Some(tag) => {
                    slots.remove(&(chat_id, user_id))
                }
                _ => None,
            }
        };
        if let Some(slot) = removed {
            if let Err(e) = self.transport.delete(chat_id, slot.message_id).await {
                debug!(chat_id, message_id = slot.message_id, error = %e,
                    "Failed to delete tagged bot message");
            }
        }
    }

    #[cfg(test)]
    pub async fn tracked(&self, chat_id: ChatId, user_id: UserId) -> Option<(MsgId, Option<String>)> {
        self.slots
            .lock()
            .await
            .get(&(chat_id, user_id))
            .map(|s| (s.message_id, s.tag.clone()))
    }
}
