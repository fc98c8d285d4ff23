use sqlx::SqlitePool;
use std::sync::Arc;

use promoshare_db::repositories::{
    ChatRepository, JobRepository, OfferRepository, TemplateRepository, UserRepository,
};

use crate::bot::utils::channel_check::SubscriptionChecker;
use crate::config::Config;
use crate::services::broadcast_service::BroadcastService;
use crate::services::redemption_service::RedemptionService;
use crate::services::referral_service::ReferralService;
use crate::services::stats_service::{db_file_path, StatsService};
use crate::services::task_service::TaskService;
use crate::session::Sessions;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub bot_username: String,

    pub users: UserRepository,
    pub offers: OfferRepository,
    pub templates: TemplateRepository,
    pub chats: ChatRepository,
    pub jobs: JobRepository,

    pub referrals: ReferralService,
    pub redemptions: RedemptionService,
    pub task_service: TaskService,
    pub broadcasts: BroadcastService,
    pub stats: StatsService,

    pub sessions: Sessions,
    pub subscription: SubscriptionChecker,
}

impl AppState {
    pub fn new(cfg: Config, pool: SqlitePool, bot_username: String) -> Self {
        let db_path = db_file_path(&cfg.database_url);
        Self {
            users: UserRepository::new(pool.clone()),
            offers: OfferRepository::new(pool.clone()),
            templates: TemplateRepository::new(pool.clone()),
            chats: ChatRepository::new(pool.clone()),
            jobs: JobRepository::new(pool.clone()),
            referrals: ReferralService::new(pool.clone(), cfg.qualification_days),
            redemptions: RedemptionService::new(pool.clone()),
            task_service: TaskService::new(
                pool.clone(),
                bot_username.clone(),
                cfg.repost_target.clone(),
            ),
            broadcasts: BroadcastService::new(pool.clone()),
            stats: StatsService::new(pool, cfg.exports_dir.clone(), db_path),
            sessions: Sessions::new(),
            subscription: SubscriptionChecker::new(cfg.channel_id),
            bot_username,
            cfg: Arc::new(cfg),
        }
    }
}
