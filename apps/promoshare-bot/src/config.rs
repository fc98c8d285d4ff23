use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Environment-driven configuration, loaded once at startup. Everything
/// except the bot token has a default relative to the working directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub database_url: String,
    pub base_dir: PathBuf,
    pub memes_dir: PathBuf,
    pub screenshots_dir: PathBuf,
    pub exports_dir: PathBuf,
    pub admin_ids: Vec<i64>,
    /// Channel the referral must stay subscribed to. `None` disables the
    /// subscription gate entirely.
    pub channel_id: Option<i64>,
    pub channel_invite_link: String,
    pub support_contact: String,
    /// Channel handle users are asked to repost.
    pub repost_target: String,
    pub gift_code: String,
    pub qualification_days: i64,
    pub reminder_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").context("BOT_TOKEN is not set")?;

        let base_dir = PathBuf::from(env::var("BASE_DIR").unwrap_or_else(|_| ".".to_string()));
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!("sqlite://{}", base_dir.join("promoshare.db").display())
        });

        let admin_ids = env::var("ADMIN_IDS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| s.trim().parse::<i64>().ok())
            .collect();

        let channel_id = env::var("REQUIRED_CHANNEL_ID")
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok());

        Ok(Self {
            bot_token,
            database_url,
            memes_dir: base_dir.join("memes"),
            screenshots_dir: base_dir.join("screenshots"),
            exports_dir: base_dir.join("exports"),
            base_dir,
            admin_ids,
            channel_id,
            channel_invite_link: env::var("CHANNEL_INVITE_LINK").unwrap_or_default(),
            support_contact: env::var("SUPPORT_CONTACT")
                .unwrap_or_else(|_| "@promoshare_support".to_string()),
            repost_target: env::var("REPOST_TARGET")
                .unwrap_or_else(|_| "@promoshare".to_string()),
            gift_code: env::var("GIFT_CODE").unwrap_or_else(|_| "WELCOME50".to_string()),
            qualification_days: env::var("QUALIFICATION_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            reminder_minutes: env::var("REMINDER_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(23),
        })
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.memes_dir, &self.screenshots_dir, &self.exports_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}
