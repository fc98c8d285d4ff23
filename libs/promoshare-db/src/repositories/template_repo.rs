use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::models::{MemeTemplate, TextTemplate};

#[derive(Debug, Clone)]
pub struct TemplateRepository {
    pool: SqlitePool,
}

impl TemplateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn add_meme(&self, file_path: &str, text: &str) -> Result<i64> {
        let id = sqlx::query("INSERT INTO meme_templates (file_path, text) VALUES (?, ?)")
            .bind(file_path)
            .bind(text)
            .execute(&self.pool)
            .await
            .context("Failed to insert meme template")?
            .last_insert_rowid();
        Ok(id)
    }

    pub async fn random_meme(&self) -> Result<Option<MemeTemplate>> {
        let meme = sqlx::query_as::<_, MemeTemplate>(
            "SELECT id, file_path, text FROM meme_templates ORDER BY RANDOM() LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(meme)
    }

    pub async fn list_memes(&self) -> Result<Vec<MemeTemplate>> {
        let memes = sqlx::query_as::<_, MemeTemplate>(
            "SELECT id, file_path, text FROM meme_templates ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(memes)
    }

    /// Delete a meme row; returns the stored file path so the caller can
    /// remove the file as well.
    pub async fn delete_meme(&self, id: i64) -> Result<Option<String>> {
        let path: Option<String> =
            sqlx::query_scalar("SELECT file_path FROM meme_templates WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        if path.is_some() {
            sqlx::query("DELETE FROM meme_templates WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(path)
    }

    pub async fn add_text(&self, text: &str) -> Result<i64> {
        let id = sqlx::query("INSERT INTO text_templates (text) VALUES (?)")
            .bind(text)
            .execute(&self.pool)
            .await
            .context("Failed to insert text template")?
            .last_insert_rowid();
        Ok(id)
    }

    pub async fn random_text(&self) -> Result<Option<TextTemplate>> {
        let text = sqlx::query_as::<_, TextTemplate>(
            "SELECT id, text FROM text_templates ORDER BY RANDOM() LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(text)
    }

    pub async fn list_texts(&self) -> Result<Vec<TextTemplate>> {
        let texts =
            sqlx::query_as::<_, TextTemplate>("SELECT id, text FROM text_templates ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(texts)
    }

    pub async fn delete_text(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM text_templates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
