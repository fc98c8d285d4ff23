use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub ref_by: Option<i64>,
    pub promo_code: String,
    pub referrals_count: i64,
    pub loyal_referrals: i64,
    pub used_loyal: i64,
    pub pending_tasks: i64,
    pub completed_tasks: i64,
    pub joined_date: DateTime<Utc>,
}

impl User {
    /// Spendable loyalty credit. The raw difference can go negative only
    /// through manual DB edits; the exposed value never does.
    pub fn available_balance(&self) -> i64 {
        (self.loyal_referrals - self.used_loyal).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(loyal: i64, used: i64) -> User {
        User {
            user_id: 1,
            username: None,
            first_name: None,
            last_name: None,
            ref_by: None,
            promo_code: "ABC123".to_string(),
            referrals_count: 0,
            loyal_referrals: loyal,
            used_loyal: used,
            pending_tasks: 0,
            completed_tasks: 0,
            joined_date: Utc::now(),
        }
    }

    #[test]
    fn balance_is_floored_at_zero() {
        assert_eq!(user(2, 1).available_balance(), 1);
        assert_eq!(user(1, 1).available_balance(), 0);
        assert_eq!(user(0, 3).available_balance(), 0);
    }
}
