mod channels;
mod config;
mod digest;
mod errors;
mod gate;
mod keyboards;
mod providers;
mod replies;
mod router;
mod slots;
mod state;
mod timers;
mod traits;
mod types;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use teloxide::Bot;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::channels::{TelegramChannel, TelegramTransport};
use crate::config::AppConfig;
use crate::digest::DigestScheduler;
use crate::gate::UsageGate;
use crate::providers::OpenAiCompatibleProvider;
use crate::router::Router;
use crate::slots::MessageSlotTracker;
use crate::state::SqliteStateStore;
use crate::timers::TimerEngine;
use crate::traits::{ModelProvider, StateStore, Transport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = AppConfig::load(&config_path)?;
    info!(config = %config_path.display(), "Configuration loaded");

    let state: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(&config.state.db_path).await?);
    info!(db = %config.state.db_path, "State store ready");

    let provider: Option<Arc<dyn ModelProvider>> = match &config.provider {
        Some(provider_config) => {
            info!(model = %provider_config.model, "Generation backend configured");
            Some(Arc::new(OpenAiCompatibleProvider::new(provider_config)?))
        }
        None => {
            info!("No generation backend configured; coach replies use static fallbacks");
            None
        }
    };
    let model_name = config.provider.as_ref().map(|p| p.model.clone());

    let bot = Bot::new(&config.telegram.bot_token);
    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot.clone()));
    let slots = Arc::new(MessageSlotTracker::new(Arc::clone(&transport)));
    let timers = Arc::new(TimerEngine::new(
        Arc::clone(&state),
        Arc::clone(&slots),
        &config.timer,
    ));
    let gate = Arc::new(UsageGate::new(
        Arc::clone(&state),
        provider,
        config.usage.clone(),
    ));

    let digest = Arc::new(DigestScheduler::new(
        Arc::clone(&state),
        Arc::clone(&transport),
        Arc::clone(&gate),
        &config.digest,
    )?);
    digest.spawn();

    let router = Arc::new(Router::new(
        state,
        transport,
        slots,
        timers,
        gate,
        config.telegram.admin_user_ids.clone(),
        model_name,
    ));

    TelegramChannel::new(bot, router).start().await;
    Ok(())
}
