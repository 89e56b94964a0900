/// Telegram user id, also used as the actor id in the event ledger.
pub type UserId = i64;

/// Telegram chat id. For private chats this equals the user id.
pub type ChatId = i64;

/// Transport-level message id.
pub type MsgId = i32;

/// Sentinel actor for global (non-per-user) ledger rows such as total AI spend.
pub const GLOBAL_ACTOR: UserId = 0;

/// Ledger event kinds. The ledger itself is schemaless; these constants keep
/// writers and aggregate readers in agreement.
pub mod event {
    pub const START: &str = "start";
    pub const TIMER_START: &str = "timer_start";
    pub const TIMER_CANCEL: &str = "timer_cancel";
    pub const TIMER_DONE: &str = "timer_done";
    pub const POSTTIMER_WIN: &str = "posttimer_win";
    pub const POSTTIMER_FAIL: &str = "posttimer_fail";
    pub const AI_CALL: &str = "ai_call";
    pub const AI_USD: &str = "ai_usd";
    pub const AI_BLOCK: &str = "ai_block";
    pub const FREE_CHAT: &str = "free_chat";
    pub const FEEDBACK: &str = "feedback";
}

/// Slot tags classifying the last bot message in a chat. A send that would
/// replace a message whose tag is in its `preserve_tags` leaves that message
/// alone.
pub mod tag {
    pub const ONBOARDING: &str = "onboarding";
    pub const MENU: &str = "menu";
    pub const HELP: &str = "help";
    pub const STATS: &str = "stats";
    pub const USAGE: &str = "usage";
    pub const TIMER: &str = "timer";
    pub const TIMER_MENU: &str = "timer_menu";
    pub const POST_TIMER: &str = "post_timer";
    pub const REASONS: &str = "reasons";
    pub const COACH: &str = "coach";
    pub const ASK: &str = "ask";
    pub const FEEDBACK: &str = "feedback";
    pub const START_NOW: &str = "startnow";
}

/// Aggregates derived from the event ledger, never stored directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserStats {
    pub wins: i64,
    pub losses: i64,
    pub total_focus_minutes: i64,
    pub timers_today: i64,
    pub minutes_today: i64,
}

/// Transport-neutral inline keyboard, rendered to the concrete markup type
/// by the channel implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}
