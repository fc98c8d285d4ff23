use sqlx::SqlitePool;
use std::path::Path;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tracing::{info, warn};

use promoshare_db::repositories::UserRepository;

use crate::error::ServiceError;

/// Admin broadcasts. A failed send bumps the error counter and the fan-out
/// keeps going; one blocked user must never starve the rest.
#[derive(Clone)]
pub struct BroadcastService {
    users: UserRepository,
}

#[derive(Debug, Default, PartialEq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub errors: usize,
}

impl BroadcastService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            users: UserRepository::new(pool),
        }
    }

    pub async fn broadcast_all(
        &self,
        bot: &Bot,
        text: &str,
        photo: Option<&Path>,
    ) -> Result<BroadcastReport, ServiceError> {
        let ids = self.users.all_ids().await?;
        info!("Broadcasting to {} users", ids.len());

        let mut report = BroadcastReport::default();
        for user_id in ids {
            match Self::deliver(bot, user_id, text, photo).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    warn!("Broadcast to {} failed: {}", user_id, e);
                    report.errors += 1;
                }
            }
            // Stay well under Telegram's ~30 msg/s ceiling.
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        info!(
            "Broadcast complete: {} sent, {} failed",
            report.sent, report.errors
        );
        Ok(report)
    }

    /// Single-target broadcast. `input` is "@username message body".
    pub async fn send_single(
        &self,
        bot: &Bot,
        input: &str,
        photo: Option<&Path>,
    ) -> Result<BroadcastReport, ServiceError> {
        let mut parts = input.splitn(2, ' ');
        let username = parts.next().unwrap_or("").trim_start_matches('@');
        let body = parts.next().unwrap_or("").trim();
        if username.is_empty() || body.is_empty() {
            return Err(ServiceError::validation(
                "❌ Wrong format. Use: @username message text",
            ));
        }

        let user_id = self
            .users
            .get_id_by_username(username)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;

        match Self::deliver(bot, user_id, body, photo).await {
            Ok(()) => Ok(BroadcastReport { sent: 1, errors: 0 }),
            Err(e) => {
                warn!("Direct message to {} failed: {}", user_id, e);
                Ok(BroadcastReport { sent: 0, errors: 1 })
            }
        }
    }

    async fn deliver(
        bot: &Bot,
        user_id: i64,
        text: &str,
        photo: Option<&Path>,
    ) -> Result<(), teloxide::RequestError> {
        match photo {
            Some(path) => {
                bot.send_photo(ChatId(user_id), InputFile::file(path.to_path_buf()))
                    .caption(text.to_string())
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
            None => {
                bot.send_message(ChatId(user_id), text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
        }
        Ok(())
    }
}
