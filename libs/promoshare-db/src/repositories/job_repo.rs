use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::models::{JobKind, ScheduledJob};

/// Durable one-shot timers. Rows survive restarts; anything unfired gets
/// re-armed at startup, so a lost in-memory timer only delays a check
/// instead of dropping it.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &SqliteRow) -> Option<ScheduledJob> {
        let kind: String = row.try_get("kind").ok()?;
        Some(ScheduledJob {
            id: row.try_get("id").ok()?,
            kind: JobKind::parse(&kind)?,
            chat_id: row.try_get("chat_id").ok()?,
            payload: row.try_get("payload").ok().flatten(),
            due_at: row.try_get("due_at").ok()?,
            fired: row.try_get::<i64, _>("fired").unwrap_or(0) != 0,
        })
    }

    pub async fn schedule(
        &self,
        kind: JobKind,
        chat_id: i64,
        payload: Option<i64>,
        due_at: DateTime<Utc>,
    ) -> Result<ScheduledJob> {
        let id = sqlx::query(
            "INSERT INTO scheduled_jobs (kind, chat_id, payload, due_at) VALUES (?, ?, ?, ?)",
        )
        .bind(kind.as_str())
        .bind(chat_id)
        .bind(payload)
        .bind(due_at)
        .execute(&self.pool)
        .await
        .context("Failed to schedule job")?
        .last_insert_rowid();

        Ok(ScheduledJob {
            id,
            kind,
            chat_id,
            payload,
            due_at,
            fired: false,
        })
    }

    pub async fn unfired(&self) -> Result<Vec<ScheduledJob>> {
        let rows = sqlx::query("SELECT * FROM scheduled_jobs WHERE fired = 0 ORDER BY due_at")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list unfired jobs")?;
        Ok(rows.iter().filter_map(Self::row_to_job).collect())
    }

    pub async fn mark_fired(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE scheduled_jobs SET fired = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;
    use chrono::Duration;

    #[tokio::test]
    async fn fired_jobs_are_not_replayed() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let jobs = JobRepository::new(pool);

        let due = Utc::now() + Duration::days(3);
        let check = jobs
            .schedule(JobKind::LoyaltyCheck, 1, Some(2), due)
            .await
            .unwrap();
        jobs.schedule(JobKind::Reminder, 5, None, due).await.unwrap();

        assert_eq!(jobs.unfired().await.unwrap().len(), 2);

        jobs.mark_fired(check.id).await.unwrap();
        let remaining = jobs.unfired().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].kind, JobKind::Reminder);
        assert_eq!(remaining[0].chat_id, 5);
    }
}
