use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use teloxide::prelude::*;
use teloxide::types::{ChatId, UserId};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Results stay fresh enough for gating while keeping the Bot API call
/// volume down during menu-hopping.
const CACHE_TTL: Duration = Duration::from_secs(30);

/// Channel-membership gate. With no channel configured the gate is
/// disabled and everyone counts as subscribed.
#[derive(Clone)]
pub struct SubscriptionChecker {
    channel_id: Option<i64>,
    cache: Arc<Mutex<HashMap<i64, (bool, Instant)>>>,
}

impl SubscriptionChecker {
    pub fn new(channel_id: Option<i64>) -> Self {
        if channel_id.is_none() {
            info!("No REQUIRED_CHANNEL_ID configured, subscription gate disabled");
        }
        Self {
            channel_id,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn is_subscribed(&self, bot: &Bot, user_id: i64) -> bool {
        if self.channel_id.is_none() {
            return true;
        }
        if let Some((value, at)) = self.cache.lock().await.get(&user_id) {
            if at.elapsed() < CACHE_TTL {
                return *value;
            }
        }
        self.force_check(bot, user_id).await
    }

    /// Check against the Bot API, bypassing the cache. API failures
    /// degrade to "not subscribed".
    pub async fn force_check(&self, bot: &Bot, user_id: i64) -> bool {
        let Some(channel_id) = self.channel_id else {
            return true;
        };

        let is_member = match bot
            .get_chat_member(ChatId(channel_id), UserId(user_id as u64))
            .await
        {
            Ok(member) => {
                let kind = &member.kind;
                kind.is_owner() || kind.is_administrator() || kind.is_member()
            }
            Err(e) => {
                warn!("Subscription check failed for user {}: {}", user_id, e);
                false
            }
        };

        self.cache
            .lock()
            .await
            .insert(user_id, (is_member, Instant::now()));
        is_member
    }

    pub async fn clear_cache(&self, user_id: Option<i64>) {
        let mut cache = self.cache.lock().await;
        match user_id {
            Some(id) => {
                cache.remove(&id);
                info!("Subscription cache cleared for user {}", id);
            }
            None => {
                cache.clear();
                info!("Subscription cache cleared");
            }
        }
    }

    /// Human-readable diagnostic for /debug_sub.
    pub async fn debug_report(&self, bot: &Bot, user_id: i64) -> String {
        let Some(channel_id) = self.channel_id else {
            return "🔍 <b>Subscription diagnostic</b>\n\nNo channel configured.".to_string();
        };

        let mut report = format!(
            "🔍 <b>Subscription diagnostic</b>\n\n👤 <b>User:</b> {}\n📢 <b>Channel:</b> {}\n\n",
            user_id, channel_id
        );

        match bot.get_chat(ChatId(channel_id)).await {
            Ok(chat) => {
                report.push_str("✅ <b>Bot can access the channel</b>\n");
                if let Some(title) = chat.title() {
                    report.push_str(&format!("📢 <b>Title:</b> {}\n", title));
                }
            }
            Err(e) => {
                report.push_str(&format!("❌ <b>Bot cannot access the channel:</b> {}\n", e));
                return report;
            }
        }

        match bot
            .get_chat_member(ChatId(channel_id), UserId(user_id as u64))
            .await
        {
            Ok(member) => {
                let kind = &member.kind;
                let subscribed = kind.is_owner() || kind.is_administrator() || kind.is_member();
                report.push_str(&format!(
                    "\n👤 <b>Status:</b> {:?}\n✅ <b>Subscribed:</b> {}\n👑 <b>Owner:</b> {}\n⚡ <b>Admin:</b> {}",
                    kind,
                    if subscribed { "yes" } else { "no" },
                    if kind.is_owner() { "yes" } else { "no" },
                    if kind.is_administrator() { "yes" } else { "no" },
                ));
            }
            Err(e) => {
                report.push_str(&format!("\n❌ <b>Member lookup failed:</b> {}", e));
            }
        }

        report
    }
}
