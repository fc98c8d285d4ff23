pub mod broadcast_service;
pub mod redemption_service;
pub mod referral_service;
pub mod stats_service;
pub mod task_service;
