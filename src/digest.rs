//! Daily digest scheduler: a long-running poll loop that, once per calendar
//! day at the configured local hour, sends every user a summary of their
//! focus activity.
//!
//! Idempotence rests on the per-user `last_digest_date` cursor alone. The
//! cursor advances after the delivery attempt whether or not the send
//! succeeded, so a failed send is a skipped digest for that day, never a
//! retry storm.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::config::DigestConfig;
use crate::gate::UsageGate;
use crate::keyboards;
use crate::replies;
use crate::traits::{StateStore, Transport};

/// Re-check interval outside the digest hour. Short polls avoid drift from
/// long sleeps across DST changes.
const POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Sleep after a completed pass, long enough to leave the digest hour.
const POST_PASS_SLEEP: Duration = Duration::from_secs(65 * 60);
const ERROR_BACKOFF: Duration = Duration::from_secs(60);

pub struct DigestScheduler {
    state: Arc<dyn StateStore>,
    transport: Arc<dyn Transport>,
    gate: Arc<UsageGate>,
    timezone: Tz,
    hour: u32,
}

impl DigestScheduler {
    pub fn new(
        state: Arc<dyn StateStore>,
        transport: Arc<dyn Transport>,
        gate: Arc<UsageGate>,
        config: &DigestConfig,
    ) -> anyhow::Result<Self> {
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid digest timezone '{}': {}", config.timezone, e))?;
        Ok(Self {
            state,
            transport,
            gate,
            timezone,
            hour: config.hour,
        })
    }

    /// Spawn the scheduler loop as a background task. The loop never exits.
    pub fn spawn(self: Arc<Self>) {
        tokio::spawn(async move {
            info!(timezone = %self.timezone, hour = self.hour, "Digest scheduler started");
            loop {
                let now = Utc::now().with_timezone(&self.timezone);
                if now.hour() != self.hour {
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
                match self.run_pass(now.date_naive()).await {
                    Ok(sent) => {
                        info!(sent, "Digest pass complete");
                        tokio::time::sleep(POST_PASS_SLEEP).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "Digest pass failed");
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                }
            }
        });
    }

    /// One digest pass for the given local calendar date. Per-user failures
    /// are isolated: they are logged, the cursor still advances, and the
    /// pass continues with the remaining users.
    pub async fn run_pass(&self, today: NaiveDate) -> anyhow::Result<usize> {
        let users = self.state.list_users().await?;
        let mut sent = 0usize;

        for user_id in users {
            match self.state.last_digest_date(user_id).await {
                Ok(Some(date)) if date == today => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!(user_id, error = %e, "Failed to read digest cursor; skipping user");
                    continue;
                }
            }

            let stats = match self.state.fetch_stats(user_id).await {
                Ok(stats) => stats,
                Err(e) => {
                    warn!(user_id, error = %e, "Failed to compute digest stats; skipping user");
                    continue;
                }
            };

            let mut text = replies::digest_text(&stats);
            // Personalized closer for active days, subject to the same
            // quotas as any other generation.
            if stats.timers_today > 0 {
                let line = self
                    .gate
                    .try_generate(
                        user_id,
                        &replies::digest_enrichment_prompt(&stats),
                        0.8,
                        120,
                    )
                    .await;
                text.push_str("\n\n");
                text.push_str(&line);
            }

            // Private chat id equals the user id.
            match self
                .transport
                .send(user_id, &text, Some(keyboards::menu()))
                .await
            {
                Ok(_) => sent += 1,
                Err(e) => {
                    warn!(user_id, error = %e, "Digest delivery failed");
                }
            }

            // Advance the cursor regardless of send outcome: at most one
            // attempt per user per day.
            if let Err(e) = self.state.set_last_digest_date(user_id, today).await {
                warn!(user_id, error = %e, "Failed to advance digest cursor");
            }
        }

        Ok(sent)
    }
}
