use dotenvy::dotenv;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod bot;
mod config;
mod error;
mod scheduler;
mod services;
mod session;
mod state;
mod texts;

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting PromoShare bot...");

    let cfg = Config::from_env()?;
    cfg.ensure_directories()?;

    let pool = promoshare_db::db::init_db(&cfg.database_url).await?;

    let bot = Bot::new(&cfg.bot_token);
    let me = bot.get_me().await?;
    let bot_username = me.username.clone().unwrap_or_else(|| "bot".to_string());
    info!("Bot connected as: @{}", bot_username);

    let state = AppState::new(cfg, pool, bot_username);

    // Re-arm delayed jobs (loyalty checks, reminders) that did not fire
    // before the last shutdown.
    let replayed = scheduler::replay_pending(&bot, &state).await?;
    info!("Re-armed {} scheduled jobs", replayed);

    let (_shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

    bot::run_bot(bot, shutdown_rx, state).await;

    Ok(())
}
