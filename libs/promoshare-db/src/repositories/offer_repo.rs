use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::models::Offer;

#[derive(Debug, Clone)]
pub struct OfferRepository {
    pool: SqlitePool,
}

impl OfferRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, title: &str, cost: i64) -> Result<i64> {
        let id = sqlx::query("INSERT INTO promo_offers (title, cost) VALUES (?, ?)")
            .bind(title)
            .bind(cost)
            .execute(&self.pool)
            .await
            .context("Failed to insert offer")?
            .last_insert_rowid();
        Ok(id)
    }

    pub async fn get(&self, offer_id: i64) -> Result<Option<Offer>> {
        let offer = sqlx::query_as::<_, Offer>(
            "SELECT offer_id, title, cost FROM promo_offers WHERE offer_id = ?",
        )
        .bind(offer_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch offer")?;
        Ok(offer)
    }

    pub async fn list(&self) -> Result<Vec<Offer>> {
        let offers = sqlx::query_as::<_, Offer>(
            "SELECT offer_id, title, cost FROM promo_offers ORDER BY offer_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list offers")?;
        Ok(offers)
    }

    pub async fn delete(&self, offer_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM promo_offers WHERE offer_id = ?")
            .bind(offer_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
