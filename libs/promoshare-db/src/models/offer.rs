use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Admin-defined reward purchasable with loyalty credit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Offer {
    pub offer_id: i64,
    pub title: String,
    pub cost: i64,
}
