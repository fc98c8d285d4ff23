use anyhow::{Context, Result};
use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns false when the chat was already on the list.
    pub async fn add(&self, chat_username: &str) -> Result<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO allowed_chats (chat_username) VALUES (?)")
                .bind(chat_username)
                .execute(&self.pool)
                .await
                .context("Failed to insert allowed chat")?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn list_sorted(&self) -> Result<Vec<String>> {
        let chats =
            sqlx::query_scalar("SELECT chat_username FROM allowed_chats ORDER BY chat_username")
                .fetch_all(&self.pool)
                .await?;
        Ok(chats)
    }

    /// Random subset used to populate "where to post" suggestions.
    pub async fn random(&self, limit: i64) -> Result<Vec<String>> {
        let chats = sqlx::query_scalar(
            "SELECT chat_username FROM allowed_chats ORDER BY RANDOM() LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(chats)
    }

    pub async fn delete(&self, chat_username: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM allowed_chats WHERE chat_username = ?")
            .bind(chat_username)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;

    #[tokio::test]
    async fn random_subset_is_capped() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let chats = ChatRepository::new(pool);

        for i in 0..8 {
            assert!(chats.add(&format!("@chat{}", i)).await.unwrap());
        }
        // Duplicate handles are ignored, not duplicated.
        assert!(!chats.add("@chat0").await.unwrap());

        let subset = chats.random(5).await.unwrap();
        assert_eq!(subset.len(), 5);
        assert_eq!(chats.list_sorted().await.unwrap().len(), 8);
    }
}
