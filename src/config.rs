use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    /// Generation backend. Optional: without it the coach runs in
    /// fallback-only mode.
    #[serde(default)]
    pub provider: Option<ProviderConfig>,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub usage: UsageConfig,
    #[serde(default)]
    pub digest: DigestConfig,
    #[serde(default)]
    pub timer: TimerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Users who receive forwarded feedback.
    #[serde(default)]
    pub admin_user_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "refocus.db".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct UsageConfig {
    /// Per-user daily generation call cap.
    #[serde(default = "default_max_calls_per_day")]
    pub max_calls_per_day: i64,
    /// Global daily spend ceiling in USD, across all users.
    #[serde(default = "default_max_daily_spend_usd")]
    pub max_daily_spend_usd: f64,
    /// Pre-call cost estimate rate: USD per 1000 requested output tokens.
    #[serde(default = "default_usd_per_1k_tokens")]
    pub usd_per_1k_tokens: f64,
    /// Outer bound on a single generation call, on top of the provider's
    /// own HTTP timeout.
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            max_calls_per_day: default_max_calls_per_day(),
            max_daily_spend_usd: default_max_daily_spend_usd(),
            usd_per_1k_tokens: default_usd_per_1k_tokens(),
            generation_timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_max_calls_per_day() -> i64 {
    30
}
fn default_max_daily_spend_usd() -> f64 {
    1.0
}
fn default_usd_per_1k_tokens() -> f64 {
    0.0006
}
fn default_generation_timeout_secs() -> u64 {
    45
}

#[derive(Debug, Deserialize, Clone)]
pub struct DigestConfig {
    /// IANA timezone name the digest hour is evaluated in.
    #[serde(default = "default_digest_timezone")]
    pub timezone: String,
    /// Local hour (0-23) at which the daily digest fires.
    #[serde(default = "default_digest_hour")]
    pub hour: u32,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            timezone: default_digest_timezone(),
            hour: default_digest_hour(),
        }
    }
}

fn default_digest_timezone() -> String {
    "Europe/Moscow".to_string()
}
fn default_digest_hour() -> u32 {
    22
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimerConfig {
    #[serde(default = "default_min_minutes")]
    pub min_minutes: u32,
    #[serde(default = "default_max_minutes")]
    pub max_minutes: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            min_minutes: default_min_minutes(),
            max_minutes: default_max_minutes(),
        }
    }
}

fn default_min_minutes() -> u32 {
    1
}
fn default_max_minutes() -> u32 {
    180
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token must not be empty");
        }
        if self.digest.hour > 23 {
            anyhow::bail!("digest.hour must be between 0 and 23");
        }
        if self.digest.timezone.parse::<chrono_tz::Tz>().is_err() {
            anyhow::bail!(
                "digest.timezone '{}' is not a valid IANA timezone",
                self.digest.timezone
            );
        }
        if self.timer.min_minutes == 0 || self.timer.min_minutes > self.timer.max_minutes {
            anyhow::bail!(
                "timer bounds invalid: min_minutes={}, max_minutes={}",
                self.timer.min_minutes,
                self.timer.max_minutes
            );
        }
        if self.usage.max_calls_per_day < 0 {
            anyhow::bail!("usage.max_calls_per_day must not be negative");
        }
        if self.usage.max_daily_spend_usd < 0.0 || self.usage.usd_per_1k_tokens < 0.0 {
            anyhow::bail!("usage spend settings must not be negative");
        }
        if self.usage.generation_timeout_secs == 0 {
            anyhow::bail!("usage.generation_timeout_secs must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> AppConfig {
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse("[telegram]\nbot_token = \"123:abc\"\n");
        assert!(config.provider.is_none());
        assert_eq!(config.state.db_path, "refocus.db");
        assert_eq!(config.usage.max_calls_per_day, 30);
        assert!((config.usage.max_daily_spend_usd - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.usage.generation_timeout_secs, 45);
        assert_eq!(config.digest.timezone, "Europe/Moscow");
        assert_eq!(config.digest.hour, 22);
        assert_eq!(config.timer.min_minutes, 1);
        assert_eq!(config.timer.max_minutes, 180);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn provider_section_defaults() {
        let config = parse(
            "[telegram]\nbot_token = \"123:abc\"\n\n[provider]\napi_key = \"sk-test\"\n",
        );
        let provider = config.provider.unwrap();
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
        assert_eq!(provider.model, "gpt-4o-mini");
        assert_eq!(provider.request_timeout_secs, 30);
    }

    #[test]
    fn rejects_bad_digest_hour() {
        let config = parse("[telegram]\nbot_token = \"t\"\n\n[digest]\nhour = 24\n");
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_timezone() {
        let config =
            parse("[telegram]\nbot_token = \"t\"\n\n[digest]\ntimezone = \"Mars/Olympus\"\n");
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_timer_bounds() {
        let config = parse(
            "[telegram]\nbot_token = \"t\"\n\n[timer]\nmin_minutes = 60\nmax_minutes = 5\n",
        );
        assert!(config.validate().is_err());
    }
}
