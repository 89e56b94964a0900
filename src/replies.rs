//! All user-facing copy, kept as data so flows stay free of branching on
//! wording. Coach prompts, fallbacks, kick phrases, and message templates.

use rand::seq::SliceRandom;

use crate::types::UserStats;

pub const COACH_SYSTEM_PROMPT: &str = "You help people stop procrastinating. \
Be short and concrete, 2-3 sentences. Give one specific step that takes \
5-15 minutes. No therapy, no judgement.";

pub const ONBOARDING_TEXT: &str = "Hi 👋 I'm Refocus. I help you stop putting \
things off and get back to the task.\n\nWhat's in the way right now?";

pub const WELCOME_TEXT: &str =
    "Main menu. Pick an action below or just write what's going on.";

pub const HELP_TEXT: &str = "What I can do:\n\
• 🚀 Start now — a quick push into action\n\
• ⏳ Timer — agree with yourself on 5/15/30 min\n\
• 💬 Coach — a short plan and one next step\n\
• 📊 Stats — your focus minutes and wins\n\n\
You can write in your own words at any time.";

pub const TIMER_MENU_TEXT: &str = "A timer is a deal with yourself. A small \
block of time is a small win.\nPick a duration:";

pub const ASK_PROMPT_TEXT: &str = "Describe in a sentence or two what's going \
on — I'll give you a short plan and one 5-15 minute step.";

pub const FEEDBACK_PROMPT_TEXT: &str =
    "💡 Feedback\nTell me what to improve or what's missing.";

pub const FEEDBACK_THANKS_TEXT: &str = "Thanks! Noted. This helps me get better 🙌";

pub const TIMER_STOPPED_TEXT: &str = "⛔️ Timer stopped.";

/// Static replies used when the usage gate blocks a request or the backend
/// fails. Never generated, always safe to send.
const FALLBACKS: &[&str] = &[
    "Pick one simple part of the task and give it 10-15 minutes. Start small, the rest will follow.",
    "Clear your desk, set a 15 minute timer, and do one thing. Decide what's next after.",
    "Do a quick start: 5 minutes on the easiest step. The point is to switch into action.",
];

pub fn fallback() -> &'static str {
    FALLBACKS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FALLBACKS[0])
}

/// Phrases behind the "Start now" button, usable regardless of context.
const UNIVERSAL_KICKS: &[&str] = &[
    "Name one simple step and do it for 5 minutes.",
    "Clear everything else away. These 15 minutes are for one thing only.",
    "Say out loud what you'll get done in 30 minutes, then start.",
    "Do the first piece: one call, one paragraph, one shelf. 10-15 minutes.",
    "If it feels heavy, cut the task in half and start with 5 minutes.",
    "Quick start: set up your workspace and lock in for 15 minutes.",
    "Close everything else. 5 minutes, one step toward the goal.",
];

/// Extra kick phrases keyed by the onboarding context the user picked.
fn context_hints(context: &str) -> &'static [&'static str] {
    match context {
        "start" => &[
            "Start small: pick an easy piece and give it 5 minutes.",
            "Set 15 minutes and take the first obvious step.",
        ],
        "distraction" => &[
            "Put the phone out of sight and mute it for 15 minutes. One task, one block.",
            "Close the extra windows and give yourself 5 minutes on a simple step.",
        ],
        "overload" => &[
            "Break the task into pieces. Take one, the clearest, for 15 minutes.",
            "Write a 3-point plan, then 10 minutes on point one.",
        ],
        "break" => &[
            "Pause: water, movement, 5 deep breaths. Then 5 minutes on an easy part.",
            "Do a short reset and lock in for 10 minutes.",
        ],
        _ => &[],
    }
}

/// Pick a kick phrase, biased toward the user's stored context when set.
pub fn kick_phrase(context: Option<&str>) -> &'static str {
    let mut pool: Vec<&'static str> = UNIVERSAL_KICKS.to_vec();
    if let Some(ctx) = context {
        pool.extend_from_slice(context_hints(ctx));
    }
    pool.choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(UNIVERSAL_KICKS[0])
}

/// Reply shown after an onboarding context button.
pub fn onboarding_reply(variant: &str) -> &'static str {
    match variant {
        "start" => {
            "Let's start small. Pick an easy piece and give it 5 minutes — that's enough to switch on."
        }
        "distraction" => {
            "Put the phone out of sight and mute it for 15 minutes. One task, one block."
        }
        "overload" => "Break the task into pieces. Take one clear piece for 15 minutes and begin.",
        "break" => {
            "Do a short reset: water, movement, breathing. Then 5 minutes on an easy part."
        }
        _ => "Describe in a couple of sentences what's going on — I'll give you a short plan.",
    }
}

/// Reply and suggested restart duration for a "why it didn't work" reason.
/// `None` minutes means no timer suggestion (free-form follow-up instead).
pub fn reason_reply(code: &str) -> (&'static str, Option<u32>) {
    match code {
        "notify" => (
            "Mute the sound or put the phone out of sight for 15 minutes. Try again?",
            Some(15),
        ),
        "hard" => (
            "Cut the task down to a small piece and take the clearest one. Let's start with 5 minutes, just to switch on.",
            Some(5),
        ),
        "tired" => (
            "Take a mini break: water, movement, a deep breath. Then one light 5-minute step.",
            Some(5),
        ),
        "urgent" => (
            "Write down what you'll return to first once the urgent stuff is done. Then give this task 10 minutes.",
            Some(10),
        ),
        _ => (
            "Describe in your own words what's in the way — I'll suggest something.",
            None,
        ),
    }
}

pub fn coach_prompt(context: Option<&str>, text: &str) -> String {
    format!(
        "Context: {}. User: \"{}\". Give a short plan (2-3 sentences) and one 5-15 minute step.",
        context.unwrap_or(""),
        text
    )
}

pub fn timer_started_text(minutes: u32) -> String {
    format!("✅ Timer set for {} minutes.", minutes)
}

pub fn timer_done_text(minutes: u32) -> String {
    format!("⏰ {} minutes are up!\nDid you manage to focus?", minutes)
}

pub fn invalid_duration_text(min: u32, max: u32) -> String {
    format!(
        "I need a whole number of minutes between {} and {}. Try again or open the menu.",
        min, max
    )
}

pub fn custom_timer_prompt(min: u32, max: u32) -> String {
    format!("Type the number of minutes ({}-{}):", min, max)
}

pub fn win_recorded_text(minutes: u32, stats: &UserStats) -> String {
    format!(
        "🏆 Nice! +{} minutes recorded.\nWins: {} · Misses: {}",
        minutes, stats.wins, stats.losses
    )
}

pub const FAIL_FOLLOWUP_TEXT: &str = "What got in the way of focusing?";

pub fn stats_text(stats: &UserStats) -> String {
    format!(
        "📊 Your stats:\n🏆 Wins: {} · ❌ Misses: {}\n⏱ Focus minutes (total): {}\n⏳ Timers today: {} ({} min)",
        stats.wins, stats.losses, stats.total_focus_minutes, stats.timers_today, stats.minutes_today
    )
}

pub fn digest_text(stats: &UserStats) -> String {
    format!(
        "🌙 Evening recap\n🏆 Wins/misses: {}/{}\n⏳ Focus minutes: {}\n⏰ Timers today: {} ({} min)\nTomorrow — one more small step.",
        stats.wins, stats.losses, stats.total_focus_minutes, stats.timers_today, stats.minutes_today
    )
}

pub fn digest_enrichment_prompt(stats: &UserStats) -> String {
    format!(
        "The user finished {} focus timers today for {} minutes total. \
         Write one short encouraging sentence suggesting a concrete first step for tomorrow.",
        stats.timers_today, stats.minutes_today
    )
}

pub fn usage_status_text(enabled: bool, model: &str, used: i64, cap: i64, spent: f64, ceiling: f64) -> String {
    format!(
        "🤖 AI: {}\nModel: {}\nPersonal limit: {}/{} (left {})\nGlobal spend: ${:.4}/${:.4}",
        if enabled { "ON ✅" } else { "OFF ❌" },
        model,
        used,
        cap,
        (cap - used).max(0),
        spent,
        ceiling
    )
}
