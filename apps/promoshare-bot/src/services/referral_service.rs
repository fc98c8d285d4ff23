use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::future::Future;
use tracing::{info, warn};

use promoshare_db::models::{JobKind, ScheduledJob};
use promoshare_db::repositories::{CreditRepository, JobRepository, UserRepository};

use crate::error::ServiceError;

/// Referral attribution and loyalty crediting. All credit flows through
/// the loyalty ledger, so the timer path, replayed jobs and the manual
/// reconciliation scan can never double-credit a pair.
#[derive(Clone)]
pub struct ReferralService {
    users: UserRepository,
    credits: CreditRepository,
    jobs: JobRepository,
    qualification: Duration,
}

#[derive(Debug)]
pub struct Attribution {
    pub referrer_id: i64,
    /// Persisted loyalty check; the caller arms the in-memory timer.
    pub check_job: ScheduledJob,
}

pub struct ReconcileReport {
    pub processed: usize,
    /// (referrer, referral) pairs that earned fresh credit this run.
    pub credited: Vec<(i64, i64)>,
}

impl ReferralService {
    pub fn new(pool: SqlitePool, qualification_days: i64) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            credits: CreditRepository::new(pool.clone()),
            jobs: JobRepository::new(pool),
            qualification: Duration::days(qualification_days),
        }
    }

    pub fn qualification_cutoff(&self) -> DateTime<Utc> {
        Utc::now() - self.qualification
    }

    /// Bind `referral_id` to `referrer_id`, first writer wins. On success
    /// the attribution is committed before the deferred loyalty check is
    /// written, so a firing check can assume the relationship exists.
    pub async fn attribute(
        &self,
        referral_id: i64,
        referrer_id: i64,
    ) -> Result<Attribution, ServiceError> {
        if referral_id == referrer_id {
            return Err(ServiceError::validation(
                "❌ You can't be your own referrer.",
            ));
        }
        if self.users.get(referrer_id).await?.is_none() {
            return Err(ServiceError::NotFound("referrer"));
        }

        let bound = self.users.try_set_referrer(referral_id, referrer_id).await?;
        if !bound {
            return Err(ServiceError::validation(
                "⚠️ You are already linked to a referrer.",
            ));
        }
        self.users.increment_referrals_count(referrer_id).await?;

        let due = Utc::now() + self.qualification;
        let check_job = self
            .jobs
            .schedule(JobKind::LoyaltyCheck, referrer_id, Some(referral_id), due)
            .await?;

        info!(
            "Attributed referral {} to referrer {}, loyalty check due {}",
            referral_id, referrer_id, due
        );

        Ok(Attribution {
            referrer_id,
            check_job,
        })
    }

    /// The manual-entry path: resolve the code's owner, then attribute.
    pub async fn claim_promo_code(
        &self,
        user_id: i64,
        code: &str,
    ) -> Result<Attribution, ServiceError> {
        let code = code.trim().to_uppercase();

        let me = self
            .users
            .get(user_id)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        if me.promo_code == code {
            return Err(ServiceError::validation(
                "❌ You can't enter your own promo code.",
            ));
        }
        if me.ref_by.is_some() {
            return Err(ServiceError::validation(
                "⚠️ You are already linked to a referrer.",
            ));
        }

        let owner = self
            .users
            .get_by_promo_code(&code)
            .await?
            .ok_or(ServiceError::NotFound("promo code"))?;

        self.attribute(user_id, owner.user_id).await
    }

    /// Ledger-guarded credit grant. Either side of the pair may have
    /// vanished since the check was scheduled; that is a no-op, not an
    /// error.
    pub async fn grant_credit(
        &self,
        referrer_id: i64,
        referral_id: i64,
    ) -> Result<bool, ServiceError> {
        if self.users.get(referral_id).await?.is_none() {
            warn!("Referral {} no longer exists, skipping credit", referral_id);
            return Ok(false);
        }
        if self.users.get(referrer_id).await?.is_none() {
            warn!("Referrer {} no longer exists, skipping credit", referrer_id);
            return Ok(false);
        }
        Ok(self.credits.grant(referrer_id, referral_id).await?)
    }

    /// Admin-triggered sweep over referrals older than the qualification
    /// window. `is_subscribed` is injected so the scan can be exercised
    /// without a live bot. Safe to re-run: already-credited pairs are
    /// skipped by the ledger.
    pub async fn reconcile<F, Fut>(
        &self,
        mut is_subscribed: F,
    ) -> Result<ReconcileReport, ServiceError>
    where
        F: FnMut(i64) -> Fut,
        Fut: Future<Output = bool>,
    {
        let aged = self.users.referrals_older_than(self.qualification_cutoff()).await?;

        let mut report = ReconcileReport {
            processed: 0,
            credited: Vec::new(),
        };

        for (referral_id, referrer_id) in aged {
            report.processed += 1;
            if !is_subscribed(referral_id).await {
                continue;
            }
            if self.grant_credit(referrer_id, referral_id).await? {
                info!(
                    "Reconciliation credited referrer {} for referral {}",
                    referrer_id, referral_id
                );
                report.credited.push((referrer_id, referral_id));
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promoshare_db::db::run_migrations;

    async fn setup() -> (ReferralService, UserRepository, SqlitePool) {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let users = UserRepository::new(pool.clone());
        (ReferralService::new(pool.clone(), 3), users, pool)
    }

    #[tokio::test]
    async fn code_entry_binds_referrer_and_schedules_check() {
        let (service, users, pool) = setup().await;
        let alice = users.get_or_create(1, None, None, None, None).await.unwrap();
        users.get_or_create(2, None, None, None, None).await.unwrap();

        let attribution = service.claim_promo_code(2, &alice.promo_code).await.unwrap();
        assert_eq!(attribution.referrer_id, 1);
        assert_eq!(attribution.check_job.payload, Some(2));

        let alice = users.get(1).await.unwrap().unwrap();
        assert_eq!(alice.referrals_count, 1);
        assert_eq!(users.get(2).await.unwrap().unwrap().ref_by, Some(1));

        let unfired: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM scheduled_jobs WHERE fired = 0")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(unfired, 1);
    }

    #[tokio::test]
    async fn own_code_is_rejected() {
        let (service, users, _) = setup().await;
        let alice = users.get_or_create(1, None, None, None, None).await.unwrap();

        let err = service.claim_promo_code(1, &alice.promo_code).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(users.get(1).await.unwrap().unwrap().referrals_count, 0);
    }

    #[tokio::test]
    async fn unknown_code_is_rejected() {
        let (service, users, _) = setup().await;
        users.get_or_create(1, None, None, None, None).await.unwrap();

        let err = service.claim_promo_code(1, "NOPE99").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("promo code")));
    }

    #[tokio::test]
    async fn second_attribution_is_rejected() {
        let (service, users, _) = setup().await;
        let alice = users.get_or_create(1, None, None, None, None).await.unwrap();
        let bob = users.get_or_create(2, None, None, None, None).await.unwrap();
        users.get_or_create(3, None, None, None, None).await.unwrap();

        service.claim_promo_code(3, &alice.promo_code).await.unwrap();
        let err = service.claim_promo_code(3, &bob.promo_code).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // First writer stays; loser's counter untouched.
        assert_eq!(users.get(3).await.unwrap().unwrap().ref_by, Some(1));
        assert_eq!(users.get(2).await.unwrap().unwrap().referrals_count, 0);
    }

    #[tokio::test]
    async fn credit_skips_vanished_referrals() {
        let (service, users, _) = setup().await;
        users.get_or_create(1, None, None, None, None).await.unwrap();

        // Referral 99 was never created (or was deleted since scheduling).
        assert!(!service.grant_credit(1, 99).await.unwrap());
        assert_eq!(users.get(1).await.unwrap().unwrap().loyal_referrals, 0);
    }

    #[tokio::test]
    async fn reconcile_credits_once_even_when_rerun() {
        let (service, users, pool) = setup().await;
        users.get_or_create(1, None, None, None, None).await.unwrap();
        users.get_or_create(2, None, None, None, None).await.unwrap();
        users.try_set_referrer(2, 1).await.unwrap();

        // Age the referral past the qualification window.
        sqlx::query("UPDATE users SET joined_date = ? WHERE user_id = 2")
            .bind(Utc::now() - Duration::days(5))
            .execute(&pool)
            .await
            .unwrap();

        let first = service.reconcile(|_| async { true }).await.unwrap();
        assert_eq!(first.processed, 1);
        assert_eq!(first.credited, vec![(1, 2)]);

        // Re-running the scan must not double-credit the same pair.
        let second = service.reconcile(|_| async { true }).await.unwrap();
        assert_eq!(second.processed, 1);
        assert!(second.credited.is_empty());

        assert_eq!(users.get(1).await.unwrap().unwrap().loyal_referrals, 1);
    }

    #[tokio::test]
    async fn reconcile_skips_unsubscribed_referrals() {
        let (service, users, pool) = setup().await;
        users.get_or_create(1, None, None, None, None).await.unwrap();
        users.get_or_create(2, None, None, None, None).await.unwrap();
        users.try_set_referrer(2, 1).await.unwrap();
        sqlx::query("UPDATE users SET joined_date = ? WHERE user_id = 2")
            .bind(Utc::now() - Duration::days(5))
            .execute(&pool)
            .await
            .unwrap();

        let report = service.reconcile(|_| async { false }).await.unwrap();
        assert_eq!(report.processed, 1);
        assert!(report.credited.is_empty());
        assert_eq!(users.get(1).await.unwrap().unwrap().loyal_referrals, 0);
    }

    #[tokio::test]
    async fn timer_then_reconcile_grants_single_credit() {
        let (service, users, pool) = setup().await;
        users.get_or_create(1, None, None, None, None).await.unwrap();
        users.get_or_create(2, None, None, None, None).await.unwrap();
        users.try_set_referrer(2, 1).await.unwrap();
        sqlx::query("UPDATE users SET joined_date = ? WHERE user_id = 2")
            .bind(Utc::now() - Duration::days(5))
            .execute(&pool)
            .await
            .unwrap();

        // Timer path fires first, then an admin runs the sweep.
        assert!(service.grant_credit(1, 2).await.unwrap());
        let report = service.reconcile(|_| async { true }).await.unwrap();
        assert!(report.credited.is_empty());
        assert_eq!(users.get(1).await.unwrap().unwrap().loyal_referrals, 1);
    }
}
