//! Usage gate: admission control in front of the generation backend.
//!
//! Quotas are evaluated against live ledger aggregates before the backend
//! is invoked, so a blocked request never costs anything. The gate never
//! errors toward the caller; every refusal or backend failure degrades to a
//! static fallback reply.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::UsageConfig;
use crate::errors::{CoreError, QuotaScope};
use crate::replies;
use crate::traits::{ModelProvider, StateStore};
use crate::types::{event, UserId, GLOBAL_ACTOR};

#[derive(Debug, Clone)]
pub struct UsageSnapshot {
    pub enabled: bool,
    pub calls_today: i64,
    pub max_calls_per_day: i64,
    pub spend_today: f64,
    pub max_daily_spend_usd: f64,
}

pub struct UsageGate {
    state: Arc<dyn StateStore>,
    provider: Option<Arc<dyn ModelProvider>>,
    config: UsageConfig,
}

impl UsageGate {
    pub fn new(
        state: Arc<dyn StateStore>,
        provider: Option<Arc<dyn ModelProvider>>,
        config: UsageConfig,
    ) -> Self {
        Self {
            state,
            provider,
            config,
        }
    }

    pub fn enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Deterministic pre-call estimate: linear in requested output size.
    /// The real cost is unknown until after the call, so the ceiling is a
    /// soft cap when the estimate under-shoots.
    pub fn estimate_cost(&self, max_tokens: u32) -> f64 {
        max_tokens as f64 / 1000.0 * self.config.usd_per_1k_tokens
    }

    pub async fn calls_today(&self, user_id: UserId) -> anyhow::Result<i64> {
        self.state
            .count_events_today(Some(user_id), event::AI_CALL)
            .await
    }

    /// Global spend today, across all users.
    pub async fn spend_today(&self) -> anyhow::Result<f64> {
        self.state.sum_events_today(None, event::AI_USD).await
    }

    pub async fn snapshot(&self, user_id: UserId) -> anyhow::Result<UsageSnapshot> {
        Ok(UsageSnapshot {
            enabled: self.enabled(),
            calls_today: self.calls_today(user_id).await?,
            max_calls_per_day: self.config.max_calls_per_day,
            spend_today: self.spend_today().await?,
            max_daily_spend_usd: self.config.max_daily_spend_usd,
        })
    }

    async fn check_quota(&self, user_id: UserId, estimate: f64) -> Result<(), CoreError> {
        let calls = self
            .calls_today(user_id)
            .await
            .map_err(CoreError::Internal)?;
        if calls >= self.config.max_calls_per_day {
            return Err(CoreError::QuotaExceeded {
                scope: QuotaScope::PerUser,
            });
        }
        let spent = self.spend_today().await.map_err(CoreError::Internal)?;
        if spent + estimate > self.config.max_daily_spend_usd {
            return Err(CoreError::QuotaExceeded {
                scope: QuotaScope::Global,
            });
        }
        Ok(())
    }

    /// Generate a coach reply for `user_prompt`, or a static fallback when
    /// the gate blocks, the backend fails, or no backend is configured.
    pub async fn try_generate(
        &self,
        user_id: UserId,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> String {
        let provider = match &self.provider {
            Some(p) => p,
            None => return replies::fallback().to_string(),
        };

        let estimate = self.estimate_cost(max_tokens);
        match self.check_quota(user_id, estimate).await {
            Ok(()) => {}
            Err(reason) => {
                info!(user_id, %reason, "Generation blocked by usage gate");
                if let Err(e) = self
                    .state
                    .append_event(user_id, event::AI_BLOCK, Some(1.0))
                    .await
                {
                    warn!(user_id, error = %e, "Failed to record ai_block event");
                }
                return replies::fallback().to_string();
            }
        }

        let call = provider.complete(
            replies::COACH_SYSTEM_PROMPT,
            user_prompt,
            temperature,
            max_tokens,
        );
        // Outer bound on top of the provider's own HTTP timeout. A stalled
        // backend must not starve user interactions.
        let limit = Duration::from_secs(self.config.generation_timeout_secs);
        let outcome = match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("generation timed out after {:?}", limit)),
        };

        // The call event is recorded either way: an attempt consumes quota.
        if let Err(e) = self
            .state
            .append_event(user_id, event::AI_CALL, Some(1.0))
            .await
        {
            warn!(user_id, error = %e, "Failed to record ai_call event");
        }

        match outcome {
            Ok(text) if !text.trim().is_empty() => {
                if let Err(e) = self
                    .state
                    .append_event(GLOBAL_ACTOR, event::AI_USD, Some(estimate))
                    .await
                {
                    warn!(error = %e, "Failed to record ai_usd event");
                }
                text.trim().to_string()
            }
            Ok(_) => {
                warn!(user_id, "Backend returned an empty completion");
                replies::fallback().to_string()
            }
            Err(e) => {
                warn!(user_id, error = %e, "Generation backend failed");
                replies::fallback().to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStateStore, MockProvider};
    use chrono::Utc;

    const USER: UserId = 42;

    fn gate_with(
        provider: Option<Arc<MockProvider>>,
        config: UsageConfig,
    ) -> (Arc<MemoryStateStore>, UsageGate) {
        let state = Arc::new(MemoryStateStore::new());
        let gate = UsageGate::new(
            state.clone() as Arc<dyn StateStore>,
            provider.map(|p| p as Arc<dyn ModelProvider>),
            config,
        );
        (state, gate)
    }

    #[tokio::test]
    async fn per_user_cap_blocks_without_calling_backend() {
        let provider = Arc::new(MockProvider::new());
        let config = UsageConfig {
            max_calls_per_day: 3,
            ..UsageConfig::default()
        };
        let (state, gate) = gate_with(Some(provider.clone()), config);

        let today = Utc::now().date_naive();
        for _ in 0..3 {
            state.seed_event(USER, event::AI_CALL, Some(1.0), today);
        }

        let reply = gate.try_generate(USER, "help me focus", 0.8, 200).await;

        assert!(!reply.is_empty());
        assert_eq!(provider.calls(), 0);
        assert_eq!(state.count_kind(USER, event::AI_BLOCK), 1);
        assert_eq!(state.count_kind(USER, event::AI_CALL), 3);
    }

    #[tokio::test]
    async fn yesterdays_calls_do_not_count_against_today() {
        let provider = Arc::new(MockProvider::new());
        let config = UsageConfig {
            max_calls_per_day: 3,
            ..UsageConfig::default()
        };
        let (state, gate) = gate_with(Some(provider.clone()), config);

        let yesterday = Utc::now().date_naive().pred_opt().unwrap();
        for _ in 0..3 {
            state.seed_event(USER, event::AI_CALL, Some(1.0), yesterday);
        }

        gate.try_generate(USER, "help", 0.8, 200).await;
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn global_ceiling_blocks_when_estimate_would_exceed_it() {
        let provider = Arc::new(MockProvider::new());
        let config = UsageConfig {
            max_calls_per_day: 30,
            max_daily_spend_usd: 1.0,
            usd_per_1k_tokens: 0.001,
            ..UsageConfig::default()
        };
        let (state, gate) = gate_with(Some(provider.clone()), config);

        // 0.9995 spent; estimate for 1000 tokens is 0.001; 1.0005 > 1.00.
        state.seed_event(
            GLOBAL_ACTOR,
            event::AI_USD,
            Some(0.9995),
            Utc::now().date_naive(),
        );

        gate.try_generate(USER, "help", 0.8, 1000).await;

        assert_eq!(provider.calls(), 0);
        assert_eq!(state.count_kind(USER, event::AI_BLOCK), 1);
    }

    #[tokio::test]
    async fn spend_exactly_at_ceiling_is_allowed() {
        let provider = Arc::new(MockProvider::new());
        let config = UsageConfig {
            max_calls_per_day: 30,
            max_daily_spend_usd: 1.0,
            usd_per_1k_tokens: 0.001,
            ..UsageConfig::default()
        };
        let (state, gate) = gate_with(Some(provider.clone()), config);
        state.seed_event(
            GLOBAL_ACTOR,
            event::AI_USD,
            Some(0.999),
            Utc::now().date_naive(),
        );

        // 0.999 + 0.001 == 1.00, not over it.
        gate.try_generate(USER, "help", 0.8, 1000).await;
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn success_records_call_and_spend() {
        let provider = Arc::new(MockProvider::with_responses(vec![Ok(
            "One small step.".to_string()
        )]));
        let (state, gate) = gate_with(Some(provider.clone()), UsageConfig::default());

        let reply = gate.try_generate(USER, "help", 0.8, 200).await;

        assert_eq!(reply, "One small step.");
        assert_eq!(state.count_kind(USER, event::AI_CALL), 1);
        let spend = state.events_of_kind(event::AI_USD);
        assert_eq!(spend.len(), 1);
        assert_eq!(spend[0].user_id, GLOBAL_ACTOR);
        let expected = 200.0 / 1000.0 * 0.0006;
        assert!((spend[0].value.unwrap() - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn backend_failure_falls_back_without_charging_spend() {
        let provider = Arc::new(MockProvider::failing());
        let (state, gate) = gate_with(Some(provider.clone()), UsageConfig::default());

        let reply = gate.try_generate(USER, "help", 0.8, 200).await;

        assert!(!reply.is_empty());
        assert_eq!(state.count_kind(USER, event::AI_CALL), 1);
        assert!(state.events_of_kind(event::AI_USD).is_empty());
    }

    #[tokio::test]
    async fn empty_completion_falls_back() {
        let provider = Arc::new(MockProvider::with_responses(vec![Ok("   ".to_string())]));
        let (state, gate) = gate_with(Some(provider.clone()), UsageConfig::default());

        let reply = gate.try_generate(USER, "help", 0.8, 200).await;

        assert!(!reply.trim().is_empty());
        assert_eq!(state.count_kind(USER, event::AI_CALL), 1);
        assert!(state.events_of_kind(event::AI_USD).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_backend_times_out_to_fallback() {
        let provider = Arc::new(MockProvider::stalled());
        let (state, gate) = gate_with(Some(provider.clone()), UsageConfig::default());

        let reply = gate.try_generate(USER, "help", 0.8, 200).await;

        assert!(!reply.is_empty());
        assert_eq!(provider.calls(), 1);
        // The attempt consumed quota but charged no spend.
        assert_eq!(state.count_kind(USER, event::AI_CALL), 1);
        assert!(state.events_of_kind(event::AI_USD).is_empty());
    }

    #[tokio::test]
    async fn no_provider_means_fallback_without_events() {
        let (state, gate) = gate_with(None, UsageConfig::default());
        let reply = gate.try_generate(USER, "help", 0.8, 200).await;
        assert!(!reply.is_empty());
        assert_eq!(state.count_kind(USER, event::AI_CALL), 0);
        assert_eq!(state.count_kind(USER, event::AI_BLOCK), 0);
    }

    #[test]
    fn cost_estimate_is_linear_in_requested_tokens() {
        let state = Arc::new(MemoryStateStore::new());
        let gate = UsageGate::new(
            state as Arc<dyn StateStore>,
            None,
            UsageConfig {
                usd_per_1k_tokens: 0.0006,
                ..UsageConfig::default()
            },
        );
        assert!((gate.estimate_cost(220) - 0.000132).abs() < 1e-12);
        assert!((gate.estimate_cost(0)).abs() < f64::EPSILON);
    }
}
