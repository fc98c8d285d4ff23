use anyhow::{Context, Result};
use sqlx::SqlitePool;

/// Loyalty-credit ledger. Every grant goes through [`grant`](Self::grant),
/// which makes crediting a given (referrer, referral) pair at-most-once no
/// matter how many paths race on it: the one-shot timer, a replayed job
/// after restart, and the manual reconciliation scan.
#[derive(Debug, Clone)]
pub struct CreditRepository {
    pool: SqlitePool,
}

impl CreditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert-or-skip into the ledger; the counter moves only on a fresh
    /// insert. Returns whether credit was actually granted.
    pub async fn grant(&self, referrer_id: i64, referral_id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO loyalty_credits (referrer_id, referral_id) VALUES (?, ?)",
        )
        .bind(referrer_id)
        .bind(referral_id)
        .execute(&mut *tx)
        .await
        .context("Failed to record loyalty credit")?
        .rows_affected()
            == 1;

        if inserted {
            sqlx::query(
                "UPDATE users SET loyal_referrals = loyal_referrals + 1 WHERE user_id = ?",
            )
            .bind(referrer_id)
            .execute(&mut *tx)
            .await
            .context("Failed to increment loyal referral counter")?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn is_credited(&self, referrer_id: i64, referral_id: i64) -> Result<bool> {
        let exists = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loyalty_credits WHERE referrer_id = ? AND referral_id = ?)",
        )
        .bind(referrer_id)
        .bind(referral_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;
    use crate::repositories::user_repo::UserRepository;

    async fn setup() -> (CreditRepository, UserRepository) {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let users = UserRepository::new(pool.clone());
        users.get_or_create(1, None, None, None, None).await.unwrap();
        users.get_or_create(2, None, None, None, None).await.unwrap();
        (CreditRepository::new(pool), users)
    }

    #[tokio::test]
    async fn credit_is_granted_at_most_once_per_pair() {
        let (credits, users) = setup().await;

        assert!(credits.grant(1, 2).await.unwrap());
        // Timer replay and reconciliation both hit the same ledger row.
        assert!(!credits.grant(1, 2).await.unwrap());
        assert!(!credits.grant(1, 2).await.unwrap());

        assert_eq!(users.get(1).await.unwrap().unwrap().loyal_referrals, 1);
        assert!(credits.is_credited(1, 2).await.unwrap());
    }

    #[tokio::test]
    async fn distinct_referrals_each_earn_one_credit() {
        let (credits, users) = setup().await;
        users.get_or_create(3, None, None, None, None).await.unwrap();

        assert!(credits.grant(1, 2).await.unwrap());
        assert!(credits.grant(1, 3).await.unwrap());
        assert_eq!(users.get(1).await.unwrap().unwrap().loyal_referrals, 2);
    }
}
