//! Inline keyboard layouts. Callback data uses the `prefix:action` scheme
//! parsed by the router.

use crate::types::{Button, Keyboard};

pub fn menu() -> Keyboard {
    Keyboard::new(vec![
        vec![Button::new("🚀 Start now", "startnow:start")],
        vec![
            Button::new("⏳ Timer", "menu:timer"),
            Button::new("💬 Coach", "ask"),
        ],
        vec![
            Button::new("📊 Stats", "menu:stats"),
            Button::new("💡 Feedback", "menu:feedback"),
        ],
        vec![Button::new("ℹ️ What I can do", "menu:help")],
    ])
}

pub fn timers() -> Keyboard {
    Keyboard::new(vec![
        vec![
            Button::new("5 min", "timer:5"),
            Button::new("15 min", "timer:15"),
            Button::new("30 min", "timer:30"),
        ],
        vec![Button::new("Custom…", "timer:custom")],
        vec![Button::new("⬅️ Main menu", "menu:root")],
    ])
}

pub fn timer_running() -> Keyboard {
    Keyboard::new(vec![
        vec![Button::new("⏹ Stop", "timer:stop")],
        vec![Button::new("🏠 Main menu", "menu:root")],
    ])
}

pub fn post_timer(minutes: u32) -> Keyboard {
    Keyboard::new(vec![
        vec![
            Button::new("✅ Yes", format!("posttimer:win:{}", minutes)),
            Button::new("❌ Didn't work", format!("posttimer:fail:{}", minutes)),
        ],
        vec![Button::new("🏠 Main menu", "menu:root")],
    ])
}

pub fn reasons() -> Keyboard {
    Keyboard::new(vec![
        vec![Button::new("📱 Notifications/social", "reason:notify")],
        vec![Button::new("🧱 Too hard/unclear", "reason:hard")],
        vec![Button::new("😵 Tired, no energy", "reason:tired")],
        vec![Button::new("🚨 Urgent things", "reason:urgent")],
        vec![Button::new("🤔 Something else", "reason:other")],
    ])
}

pub fn onboarding() -> Keyboard {
    Keyboard::new(vec![
        vec![
            Button::new("🏁 Can't start", "ob:start"),
            Button::new("📱 Distracted", "ob:distraction"),
        ],
        vec![
            Button::new("😵 Overloaded", "ob:overload"),
            Button::new("☕ Need a break", "ob:break"),
        ],
        vec![Button::new("✍️ I'll write it myself", "ask")],
    ])
}

/// Quick timer choices attached to kick phrases and onboarding replies.
pub fn kick_timers() -> Keyboard {
    Keyboard::new(vec![
        vec![
            Button::new("⏳ 5 min", "timer:5"),
            Button::new("⏳ 15 min", "timer:15"),
            Button::new("⏳ 30 min", "timer:30"),
        ],
        vec![Button::new("🏠 Main menu", "menu:root")],
    ])
}

/// One suggested restart duration after a failure reason.
pub fn suggested_timer(minutes: u32) -> Keyboard {
    Keyboard::new(vec![
        vec![Button::new(
            format!("⏳ {} min", minutes),
            format!("timer:{}", minutes),
        )],
        vec![Button::new("🏠 Main menu", "menu:root")],
    ])
}

pub fn back_to_timers() -> Keyboard {
    Keyboard::new(vec![vec![Button::new("⬅️ Back", "menu:timer")]])
}
