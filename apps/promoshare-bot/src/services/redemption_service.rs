use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use promoshare_db::models::Offer;
use promoshare_db::repositories::OfferRepository;

use crate::error::ServiceError;

/// Spending loyalty credit on offers. The debit re-validates the balance
/// inside the same transaction that writes it, so two confirmations racing
/// between select and confirm cannot drive the balance negative.
#[derive(Clone)]
pub struct RedemptionService {
    pool: SqlitePool,
    offers: OfferRepository,
}

#[derive(Debug)]
pub struct Quote {
    pub offer: Offer,
    pub available: i64,
}

impl RedemptionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            offers: OfferRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn list_offers(&self) -> Result<Vec<Offer>, ServiceError> {
        Ok(self.offers.list().await?)
    }

    /// Select step: offer plus the user's current spendable balance.
    pub async fn quote(&self, user_id: i64, offer_id: i64) -> Result<Quote, ServiceError> {
        let offer = self
            .offers
            .get(offer_id)
            .await?
            .ok_or(ServiceError::NotFound("offer"))?;

        let counters: Option<(i64, i64)> =
            sqlx::query_as("SELECT loyal_referrals, used_loyal FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        let (loyal, used) = counters.ok_or(ServiceError::NotFound("user"))?;

        Ok(Quote {
            offer,
            available: (loyal - used).max(0),
        })
    }

    /// Confirm step: balance re-check, debit and pending-task insert in one
    /// transaction. Returns the new task id and the redeemed offer.
    pub async fn confirm(
        &self,
        user_id: i64,
        offer_id: i64,
    ) -> Result<(i64, Offer), ServiceError> {
        let mut tx = self.pool.begin().await?;

        let offer: Option<Offer> = sqlx::query_as(
            "SELECT offer_id, title, cost FROM promo_offers WHERE offer_id = ?",
        )
        .bind(offer_id)
        .fetch_optional(&mut *tx)
        .await?;
        let offer = offer.ok_or(ServiceError::NotFound("offer"))?;

        let counters: Option<(i64, i64)> =
            sqlx::query_as("SELECT loyal_referrals, used_loyal FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (loyal, used) = counters.ok_or(ServiceError::NotFound("user"))?;
        let available = (loyal - used).max(0);

        if available < offer.cost {
            return Err(ServiceError::validation(format!(
                "Not enough loyal referrals: {}/{}.",
                available, offer.cost
            )));
        }

        sqlx::query(
            "UPDATE users SET used_loyal = used_loyal + ?, pending_tasks = pending_tasks + 1
             WHERE user_id = ?",
        )
        .bind(offer.cost)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let task_id = sqlx::query(
            "INSERT INTO tasks (user_id, task_type, offer_id, task_description, status, created_at)
             VALUES (?, 'promo', ?, ?, 'pending', ?)",
        )
        .bind(user_id)
        .bind(offer.offer_id)
        .bind(format!("Redeem \"{}\" for {}💖", offer.title, offer.cost))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        info!(
            "User {} redeemed offer {} ({}), task {}",
            user_id, offer.offer_id, offer.title, task_id
        );

        Ok((task_id, offer))
    }

    /// Approval tail for promo tasks: store the coupon, flip the task to
    /// approved and settle the counters, all in one transaction.
    pub async fn approve_with_coupon(
        &self,
        task_id: i64,
        user_id: i64,
        coupon_code: &str,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tasks WHERE task_id = ?)")
            .bind(task_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(ServiceError::NotFound("task"));
        }

        sqlx::query("INSERT INTO coupons (code, type) VALUES (?, 'promo')")
            .bind(coupon_code)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE tasks SET status = 'approved' WHERE task_id = ?")
            .bind(task_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE users SET
                pending_tasks = MAX(pending_tasks - 1, 0),
                completed_tasks = completed_tasks + 1
             WHERE user_id = ?",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promoshare_db::db::run_migrations;
    use promoshare_db::repositories::{CreditRepository, UserRepository};

    async fn setup() -> (RedemptionService, UserRepository, SqlitePool) {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let users = UserRepository::new(pool.clone());
        users.get_or_create(1, None, None, None, None).await.unwrap();
        (RedemptionService::new(pool.clone()), users, pool)
    }

    async fn earn_credits(pool: &SqlitePool, user_id: i64, n: i64) {
        let users = UserRepository::new(pool.clone());
        let credits = CreditRepository::new(pool.clone());
        for i in 0..n {
            let referral = 100 + i;
            users
                .get_or_create(referral, None, None, None, None)
                .await
                .unwrap();
            assert!(credits.grant(user_id, referral).await.unwrap());
        }
    }

    #[tokio::test]
    async fn shortfall_blocks_redemption_without_mutation() {
        let (service, users, pool) = setup().await;
        earn_credits(&pool, 1, 2).await;
        sqlx::query("UPDATE users SET used_loyal = 1 WHERE user_id = 1")
            .execute(&pool)
            .await
            .unwrap();
        let offers = OfferRepository::new(pool.clone());
        let costly = offers.create("Scooter coupon", 2).await.unwrap();

        let quote = service.quote(1, costly).await.unwrap();
        assert_eq!(quote.available, 1);
        assert!(quote.available < quote.offer.cost);

        let err = service.confirm(1, costly).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let user = users.get(1).await.unwrap().unwrap();
        assert_eq!(user.used_loyal, 1);
        assert_eq!(user.pending_tasks, 0);
    }

    #[tokio::test]
    async fn affordable_offer_debits_and_creates_one_task() {
        let (service, users, pool) = setup().await;
        earn_credits(&pool, 1, 2).await;
        sqlx::query("UPDATE users SET used_loyal = 1 WHERE user_id = 1")
            .execute(&pool)
            .await
            .unwrap();
        let offers = OfferRepository::new(pool.clone());
        let cheap = offers.create("Small coupon", 1).await.unwrap();

        let (task_id, offer) = service.confirm(1, cheap).await.unwrap();
        assert_eq!(offer.cost, 1);

        let user = users.get(1).await.unwrap().unwrap();
        assert_eq!(user.used_loyal, 2);
        assert_eq!(user.available_balance(), 0);
        assert_eq!(user.pending_tasks, 1);

        let task_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE user_id = 1 AND status = 'pending'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(task_count, 1);

        let offer_ref: Option<i64> =
            sqlx::query_scalar("SELECT offer_id FROM tasks WHERE task_id = ?")
                .bind(task_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(offer_ref, Some(cheap));
    }

    #[tokio::test]
    async fn confirm_recheck_catches_stale_selection() {
        let (service, _, pool) = setup().await;
        earn_credits(&pool, 1, 1).await;
        let offers = OfferRepository::new(pool.clone());
        let offer = offers.create("Coupon", 1).await.unwrap();

        // Balance was fine at select time...
        let quote = service.quote(1, offer).await.unwrap();
        assert_eq!(quote.available, 1);

        // ...but got spent by a concurrent redemption before confirm.
        sqlx::query("UPDATE users SET used_loyal = used_loyal + 1 WHERE user_id = 1")
            .execute(&pool)
            .await
            .unwrap();

        let err = service.confirm(1, offer).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_offer_is_not_found() {
        let (service, _, _) = setup().await;
        assert!(matches!(
            service.quote(1, 42).await.unwrap_err(),
            ServiceError::NotFound("offer")
        ));
        assert!(matches!(
            service.confirm(1, 42).await.unwrap_err(),
            ServiceError::NotFound("offer")
        ));
    }

    #[tokio::test]
    async fn decline_keeps_spent_credit() {
        let (service, users, pool) = setup().await;
        earn_credits(&pool, 1, 1).await;
        let offers = OfferRepository::new(pool.clone());
        let offer = offers.create("Coupon", 1).await.unwrap();
        let (task_id, _) = service.confirm(1, offer).await.unwrap();

        let tasks = promoshare_db::repositories::TaskRepository::new(pool.clone());
        tasks.decline(task_id, 1).await.unwrap();

        // Declining forfeits the credit: used_loyal is intentionally NOT
        // refunded (current product behavior, flagged for review).
        let user = users.get(1).await.unwrap().unwrap();
        assert_eq!(user.used_loyal, 1);
        assert_eq!(user.pending_tasks, 0);
        assert_eq!(user.completed_tasks, 0);
    }

    #[tokio::test]
    async fn coupon_approval_settles_task_and_counters() {
        let (service, users, pool) = setup().await;
        earn_credits(&pool, 1, 1).await;
        let offers = OfferRepository::new(pool.clone());
        let offer = offers.create("Coupon", 1).await.unwrap();
        let (task_id, _) = service.confirm(1, offer).await.unwrap();

        service
            .approve_with_coupon(task_id, 1, "RIDE-50")
            .await
            .unwrap();

        let user = users.get(1).await.unwrap().unwrap();
        assert_eq!(user.pending_tasks, 0);
        assert_eq!(user.completed_tasks, 1);

        let coupon_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM coupons WHERE code = 'RIDE-50'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(coupon_count, 1);

        let status: String = sqlx::query_scalar("SELECT status FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "approved");
    }
}
