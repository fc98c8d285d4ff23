use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::models::User;
use crate::utils::generate_promo_code;

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &SqliteRow) -> User {
        User {
            user_id: row.try_get::<i64, _>("user_id").unwrap_or_default(),
            username: row.try_get::<Option<String>, _>("username").ok().flatten(),
            first_name: row
                .try_get::<Option<String>, _>("first_name")
                .ok()
                .flatten(),
            last_name: row.try_get::<Option<String>, _>("last_name").ok().flatten(),
            ref_by: row.try_get::<Option<i64>, _>("ref_by").ok().flatten(),
            promo_code: row.try_get::<String, _>("promo_code").unwrap_or_default(),
            referrals_count: row.try_get::<i64, _>("referrals_count").unwrap_or_default(),
            loyal_referrals: row.try_get::<i64, _>("loyal_referrals").unwrap_or_default(),
            used_loyal: row.try_get::<i64, _>("used_loyal").unwrap_or_default(),
            pending_tasks: row.try_get::<i64, _>("pending_tasks").unwrap_or_default(),
            completed_tasks: row.try_get::<i64, _>("completed_tasks").unwrap_or_default(),
            joined_date: row
                .try_get::<DateTime<Utc>, _>("joined_date")
                .unwrap_or_else(|_| Utc::now()),
        }
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;
        Ok(row.map(|r| Self::row_to_user(&r)))
    }

    pub async fn get_by_promo_code(&self, code: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE promo_code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by promo code")?;
        Ok(row.map(|r| Self::row_to_user(&r)))
    }

    pub async fn get_id_by_username(&self, username: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar("SELECT user_id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by username")?;
        Ok(id)
    }

    /// Fetch an existing user or create one with a fresh unique promo code.
    /// A `ref_by` hint is only honored on the insert path; existing users go
    /// through [`try_set_referrer`](Self::try_set_referrer) so the
    /// first-writer-wins rule stays in one place.
    pub async fn get_or_create(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
        ref_by: Option<i64>,
    ) -> Result<User> {
        if let Some(existing) = self.get(user_id).await? {
            return Ok(existing);
        }

        let promo_code = self.fresh_promo_code().await?;
        let ref_by = ref_by.filter(|r| *r != user_id);

        sqlx::query(
            "INSERT INTO users
                (user_id, username, first_name, last_name, ref_by, promo_code, joined_date)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(username)
        .bind(first_name)
        .bind(last_name)
        .bind(ref_by)
        .bind(&promo_code)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to insert user")?;

        tracing::info!("Created new user {} (@{})", user_id, username.unwrap_or("-"));

        self.get(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User {} not found after insert", user_id))
    }

    async fn fresh_promo_code(&self) -> Result<String> {
        loop {
            let code = generate_promo_code();
            let taken: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE promo_code = ?)")
                    .bind(&code)
                    .fetch_one(&self.pool)
                    .await?;
            if !taken {
                return Ok(code);
            }
        }
    }

    /// Bind a referrer, first writer wins. Returns false when the user
    /// already has one, doesn't exist, or tried to refer themselves.
    pub async fn try_set_referrer(&self, user_id: i64, referrer_id: i64) -> Result<bool> {
        if user_id == referrer_id {
            return Ok(false);
        }
        let result = sqlx::query(
            "UPDATE users SET ref_by = ? WHERE user_id = ? AND ref_by IS NULL",
        )
        .bind(referrer_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to set referrer")?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn increment_referrals_count(&self, user_id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET referrals_count = referrals_count + 1 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_profile_fields(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET
                username = COALESCE(?, username),
                first_name = COALESCE(?, first_name),
                last_name = COALESCE(?, last_name)
             WHERE user_id = ?",
        )
        .bind(username)
        .bind(first_name)
        .bind(last_name)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn all_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT user_id FROM users")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list user ids")?;
        Ok(ids)
    }

    pub async fn list_all(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY user_id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;
        Ok(rows.iter().map(Self::row_to_user).collect())
    }

    pub async fn count_all(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_joined_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE joined_date >= ?")
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn latest(&self, limit: i64) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY joined_date DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::row_to_user).collect())
    }

    /// Referred users whose signup predates the cutoff, as
    /// (referral_id, referrer_id) pairs. Feeds the reconciliation scan.
    pub async fn referrals_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<(i64, i64)>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT user_id, ref_by FROM users
             WHERE ref_by IS NOT NULL AND joined_date < ?
             ORDER BY joined_date DESC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list aged referrals")?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;

    async fn repo() -> UserRepository {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        UserRepository::new(pool)
    }

    #[tokio::test]
    async fn onboarding_assigns_unique_promo_codes() {
        let repo = repo().await;
        let mut codes = std::collections::HashSet::new();
        for id in 1..=20 {
            let user = repo
                .get_or_create(id, Some("user"), Some("First"), None, None)
                .await
                .unwrap();
            assert_eq!(user.promo_code.len(), 6);
            assert!(codes.insert(user.promo_code));
        }
    }

    #[tokio::test]
    async fn get_or_create_is_stable_for_existing_users() {
        let repo = repo().await;
        let first = repo.get_or_create(1, None, None, None, None).await.unwrap();
        let second = repo.get_or_create(1, None, None, None, None).await.unwrap();
        assert_eq!(first.promo_code, second.promo_code);
        assert_eq!(repo.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn self_referral_is_rejected_at_creation() {
        let repo = repo().await;
        let user = repo.get_or_create(5, None, None, None, Some(5)).await.unwrap();
        assert_eq!(user.ref_by, None);
    }

    #[tokio::test]
    async fn referrer_is_write_once() {
        let repo = repo().await;
        repo.get_or_create(1, None, None, None, None).await.unwrap();
        repo.get_or_create(2, None, None, None, None).await.unwrap();
        repo.get_or_create(3, None, None, None, None).await.unwrap();

        assert!(repo.try_set_referrer(3, 1).await.unwrap());
        assert!(!repo.try_set_referrer(3, 2).await.unwrap());
        assert_eq!(repo.get(3).await.unwrap().unwrap().ref_by, Some(1));
    }

    #[tokio::test]
    async fn self_referral_is_rejected_on_update() {
        let repo = repo().await;
        repo.get_or_create(4, None, None, None, None).await.unwrap();
        assert!(!repo.try_set_referrer(4, 4).await.unwrap());
        assert_eq!(repo.get(4).await.unwrap().unwrap().ref_by, None);
    }
}
