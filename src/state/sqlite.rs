//! SQLite-backed state: user registry, append-only event ledger, and stored
//! free-text messages.
//!
//! Daily aggregates use a same-calendar-day predicate over `created_at`
//! (UTC), so per-day counters reset implicitly at midnight without any
//! reset logic. Ledger rows are never updated; the only mutable fields are
//! the digest cursor and personal context on `users`.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::traits::StateStore;
use crate::types::{UserId, UserStats, event};

/// Stored feedback / free-chat text is capped to keep rows bounded.
const MAX_STORED_TEXT: usize = 4000;

pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub async fn new(db_path: &str) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                created_at TEXT NOT NULL,
                personal_context TEXT,
                last_digest_date TEXT
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                value REAL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_user_created ON events(user_id, created_at DESC)",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_kind_created ON events(kind, created_at DESC)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn ensure_user(&self, user_id: UserId) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (user_id, created_at) VALUES (?, ?)
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_users(&self) -> anyhow::Result<Vec<UserId>> {
        let rows = sqlx::query("SELECT user_id FROM users ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("user_id")).collect())
    }

    async fn personal_context(&self, user_id: UserId) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT personal_context FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|r| r.get::<Option<String>, _>("personal_context")))
    }

    async fn set_personal_context(&self, user_id: UserId, context: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET personal_context = ? WHERE user_id = ?")
            .bind(context)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn last_digest_date(&self, user_id: UserId) -> anyhow::Result<Option<NaiveDate>> {
        let row = sqlx::query("SELECT last_digest_date FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        let raw: Option<String> = row.and_then(|r| r.get("last_digest_date"));
        match raw {
            Some(s) => Ok(Some(NaiveDate::parse_from_str(&s, "%Y-%m-%d")?)),
            None => Ok(None),
        }
    }

    async fn set_last_digest_date(&self, user_id: UserId, date: NaiveDate) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_digest_date = ? WHERE user_id = ?")
            .bind(date.format("%Y-%m-%d").to_string())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_event(
        &self,
        user_id: UserId,
        kind: &str,
        value: Option<f64>,
    ) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO events (user_id, kind, value, created_at) VALUES (?, ?, ?, ?)")
            .bind(user_id)
            .bind(kind)
            .bind(value)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_events_today(
        &self,
        user_id: Option<UserId>,
        kind: &str,
    ) -> anyhow::Result<i64> {
        let count: i64 = match user_id {
            Some(uid) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM events
                     WHERE user_id = ? AND kind = ? AND date(created_at) = date('now')",
                )
                .bind(uid)
                .bind(kind)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM events
                     WHERE kind = ? AND date(created_at) = date('now')",
                )
                .bind(kind)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(count)
    }

    async fn sum_events_today(&self, user_id: Option<UserId>, kind: &str) -> anyhow::Result<f64> {
        let sum: f64 = match user_id {
            Some(uid) => {
                sqlx::query_scalar(
                    "SELECT COALESCE(SUM(value), 0.0) FROM events
                     WHERE user_id = ? AND kind = ? AND date(created_at) = date('now')",
                )
                .bind(uid)
                .bind(kind)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    "SELECT COALESCE(SUM(value), 0.0) FROM events
                     WHERE kind = ? AND date(created_at) = date('now')",
                )
                .bind(kind)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(sum)
    }

    async fn fetch_stats(&self, user_id: UserId) -> anyhow::Result<UserStats> {
        let wins: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE user_id = ? AND kind = ?")
                .bind(user_id)
                .bind(event::POSTTIMER_WIN)
                .fetch_one(&self.pool)
                .await?;
        let losses: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE user_id = ? AND kind = ?")
                .bind(user_id)
                .bind(event::POSTTIMER_FAIL)
                .fetch_one(&self.pool)
                .await?;
        let total_focus: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(value), 0.0) FROM events WHERE user_id = ? AND kind = ?",
        )
        .bind(user_id)
        .bind(event::TIMER_DONE)
        .fetch_one(&self.pool)
        .await?;
        let today = sqlx::query(
            "SELECT COUNT(*) AS cnt, COALESCE(SUM(value), 0.0) AS minutes FROM events
             WHERE user_id = ? AND kind = ? AND date(created_at) = date('now')",
        )
        .bind(user_id)
        .bind(event::TIMER_DONE)
        .fetch_one(&self.pool)
        .await?;

        Ok(UserStats {
            wins,
            losses,
            total_focus_minutes: total_focus as i64,
            timers_today: today.get::<i64, _>("cnt"),
            minutes_today: today.get::<f64, _>("minutes") as i64,
        })
    }

    async fn store_message(&self, user_id: UserId, kind: &str, text: &str) -> anyhow::Result<()> {
        let bounded: String = text.chars().take(MAX_STORED_TEXT).collect();
        sqlx::query("INSERT INTO messages (user_id, kind, text, created_at) VALUES (?, ?, ?, ?)")
            .bind(user_id)
            .bind(kind)
            .bind(bounded)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
