//! Test infrastructure: MemoryStateStore, MockTransport, and MockProvider.
//!
//! The memory store implements the full StateStore contract without any IO,
//! which keeps timer tests deterministic under tokio's paused clock.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::traits::{ModelProvider, StateStore, Transport};
use crate::types::{ChatId, Keyboard, MsgId, UserId, UserStats, event};

// ---------------------------------------------------------------------------
// MemoryStateStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EventRow {
    pub user_id: UserId,
    pub kind: String,
    pub value: Option<f64>,
    pub day: NaiveDate,
}

#[derive(Debug, Clone, Default)]
struct UserRow {
    context: Option<String>,
    last_digest_date: Option<NaiveDate>,
}

#[derive(Default)]
pub struct MemoryStateStore {
    events: Mutex<Vec<EventRow>>,
    users: Mutex<BTreeMap<UserId, UserRow>>,
    messages: Mutex<Vec<(UserId, String, String)>>,
    failing_appends: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All ledger appends fail from now on.
    pub fn fail_appends(&self) {
        self.failing_appends.store(true, Ordering::SeqCst);
    }

    /// Seed an event on an arbitrary calendar day (e.g. yesterday).
    pub fn seed_event(&self, user_id: UserId, kind: &str, value: Option<f64>, day: NaiveDate) {
        self.events.lock().unwrap().push(EventRow {
            user_id,
            kind: kind.to_string(),
            value,
            day,
        });
    }

    pub fn events_of_kind(&self, kind: &str) -> Vec<EventRow> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn count_kind(&self, user_id: UserId, kind: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == user_id && e.kind == kind)
            .count()
    }

    pub fn stored_messages(&self) -> Vec<(UserId, String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn ensure_user(&self, user_id: UserId) -> anyhow::Result<()> {
        self.users.lock().unwrap().entry(user_id).or_default();
        Ok(())
    }

    async fn list_users(&self) -> anyhow::Result<Vec<UserId>> {
        Ok(self.users.lock().unwrap().keys().copied().collect())
    }

    async fn personal_context(&self, user_id: UserId) -> anyhow::Result<Option<String>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .get(&user_id)
            .and_then(|u| u.context.clone()))
    }

    async fn set_personal_context(&self, user_id: UserId, context: &str) -> anyhow::Result<()> {
        self.users
            .lock()
            .unwrap()
            .entry(user_id)
            .or_default()
            .context = Some(context.to_string());
        Ok(())
    }

    async fn last_digest_date(&self, user_id: UserId) -> anyhow::Result<Option<NaiveDate>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .get(&user_id)
            .and_then(|u| u.last_digest_date))
    }

    async fn set_last_digest_date(&self, user_id: UserId, date: NaiveDate) -> anyhow::Result<()> {
        self.users
            .lock()
            .unwrap()
            .entry(user_id)
            .or_default()
            .last_digest_date = Some(date);
        Ok(())
    }

    async fn append_event(
        &self,
        user_id: UserId,
        kind: &str,
        value: Option<f64>,
    ) -> anyhow::Result<()> {
        if self.failing_appends.load(Ordering::SeqCst) {
            anyhow::bail!("memory store: append failure injected");
        }
        self.events.lock().unwrap().push(EventRow {
            user_id,
            kind: kind.to_string(),
            value,
            day: Utc::now().date_naive(),
        });
        Ok(())
    }

    async fn count_events_today(
        &self,
        user_id: Option<UserId>,
        kind: &str,
    ) -> anyhow::Result<i64> {
        let today = Utc::now().date_naive();
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind && e.day == today)
            .filter(|e| user_id.map_or(true, |uid| e.user_id == uid))
            .count() as i64)
    }

    async fn sum_events_today(&self, user_id: Option<UserId>, kind: &str) -> anyhow::Result<f64> {
        let today = Utc::now().date_naive();
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind && e.day == today)
            .filter(|e| user_id.map_or(true, |uid| e.user_id == uid))
            .filter_map(|e| e.value)
            .sum())
    }

    async fn fetch_stats(&self, user_id: UserId) -> anyhow::Result<UserStats> {
        let today = Utc::now().date_naive();
        let events = self.events.lock().unwrap();
        let mine = || events.iter().filter(|e| e.user_id == user_id);
        let wins = mine().filter(|e| e.kind == event::POSTTIMER_WIN).count() as i64;
        let losses = mine().filter(|e| e.kind == event::POSTTIMER_FAIL).count() as i64;
        let total_focus_minutes = mine()
            .filter(|e| e.kind == event::TIMER_DONE)
            .filter_map(|e| e.value)
            .sum::<f64>() as i64;
        let timers_today = mine()
            .filter(|e| e.kind == event::TIMER_DONE && e.day == today)
            .count() as i64;
        let minutes_today = mine()
            .filter(|e| e.kind == event::TIMER_DONE && e.day == today)
            .filter_map(|e| e.value)
            .sum::<f64>() as i64;
        Ok(UserStats {
            wins,
            losses,
            total_focus_minutes,
            timers_today,
            minutes_today,
        })
    }

    async fn store_message(&self, user_id: UserId, kind: &str, text: &str) -> anyhow::Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((user_id, kind.to_string(), text.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub message_id: MsgId,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

#[derive(Default)]
pub struct MockTransport {
    next_id: AtomicI32,
    pub sent: Mutex<Vec<SentMessage>>,
    pub deleted: Mutex<Vec<(ChatId, MsgId)>>,
    pub edited: Mutex<Vec<(ChatId, MsgId, String)>>,
    failing_chats: Mutex<HashSet<ChatId>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(1),
            ..Default::default()
        }
    }

    /// All sends to this chat will fail from now on.
    pub fn fail_sends_to(&self, chat_id: ChatId) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub fn sent_texts(&self, chat_id: ChatId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn last_sent(&self) -> Option<SentMessage> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn deleted_ids(&self, chat_id: ChatId) -> Vec<MsgId> {
        self.deleted
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == chat_id)
            .map(|(_, m)| *m)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> anyhow::Result<MsgId> {
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            anyhow::bail!("mock transport: send failure injected for chat {}", chat_id);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            message_id: id,
            text: text.to_string(),
            keyboard,
        });
        Ok(id)
    }

    async fn edit(
        &self,
        chat_id: ChatId,
        message_id: MsgId,
        text: &str,
        _keyboard: Option<Keyboard>,
    ) -> anyhow::Result<()> {
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            anyhow::bail!("mock transport: edit failure injected for chat {}", chat_id);
        }
        self.edited
            .lock()
            .unwrap()
            .push((chat_id, message_id, text.to_string()));
        Ok(())
    }

    async fn delete(&self, chat_id: ChatId, message_id: MsgId) -> anyhow::Result<()> {
        self.deleted.lock().unwrap().push((chat_id, message_id));
        Ok(())
    }

    async fn typing(&self, _chat_id: ChatId) {}
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// Mock generation backend with a FIFO queue of scripted outcomes.
/// An empty queue yields the default reply.
pub struct MockProvider {
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    stalled: bool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            stalled: false,
        }
    }

    pub fn with_responses(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            stalled: false,
        }
    }

    pub fn failing() -> Self {
        Self::with_responses(vec![Err("backend unavailable".to_string())])
    }

    /// A backend that accepts the call and then never completes.
    pub fn stalled() -> Self {
        Self {
            stalled: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stalled {
            std::future::pending::<()>().await;
        }
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok("Mock coaching reply.".to_string()),
        }
    }
}
