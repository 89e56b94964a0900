use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::{ChatId, Keyboard, MsgId, UserId, UserStats};

/// Outbound message transport. Implemented by the Telegram channel; mocked
/// in tests. All methods may fail transiently; callers decide whether a
/// failure is fatal (it almost never is).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> anyhow::Result<MsgId>;

    async fn edit(
        &self,
        chat_id: ChatId,
        message_id: MsgId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> anyhow::Result<()>;

    async fn delete(&self, chat_id: ChatId, message_id: MsgId) -> anyhow::Result<()>;

    /// Best-effort typing indicator. Failures are swallowed by the
    /// implementation.
    async fn typing(&self, chat_id: ChatId);
}

/// Durable state: the append-only event ledger, the user registry, and the
/// stored-message archive. Daily aggregates are computed with a
/// same-calendar-day predicate; nothing is ever reset.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn ensure_user(&self, user_id: UserId) -> anyhow::Result<()>;

    async fn list_users(&self) -> anyhow::Result<Vec<UserId>>;

    async fn personal_context(&self, user_id: UserId) -> anyhow::Result<Option<String>>;

    async fn set_personal_context(&self, user_id: UserId, context: &str) -> anyhow::Result<()>;

    async fn last_digest_date(&self, user_id: UserId) -> anyhow::Result<Option<NaiveDate>>;

    async fn set_last_digest_date(&self, user_id: UserId, date: NaiveDate) -> anyhow::Result<()>;

    /// Append one ledger row. `value` carries minutes for timer events and
    /// USD for spend events.
    async fn append_event(
        &self,
        user_id: UserId,
        kind: &str,
        value: Option<f64>,
    ) -> anyhow::Result<()>;

    /// Count today's events of `kind`, optionally scoped to one user.
    async fn count_events_today(&self, user_id: Option<UserId>, kind: &str)
        -> anyhow::Result<i64>;

    /// Sum today's event values of `kind`, optionally scoped to one user.
    async fn sum_events_today(&self, user_id: Option<UserId>, kind: &str) -> anyhow::Result<f64>;

    async fn fetch_stats(&self, user_id: UserId) -> anyhow::Result<UserStats>;

    /// Archive a free-text message (feedback, coach questions).
    async fn store_message(&self, user_id: UserId, kind: &str, text: &str) -> anyhow::Result<()>;
}

/// Generation backend. One-shot prompt in, text out; the call is bounded by
/// the provider's own request timeout.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> anyhow::Result<String>;
}
