use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::models::{Task, TaskKind, TaskStatus};

#[derive(Debug, Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &SqliteRow) -> Option<Task> {
        let tag: String = row.try_get("task_type").ok()?;
        let offer_id: Option<i64> = row.try_get("offer_id").ok().flatten();
        let kind = TaskKind::from_row(&tag, offer_id)?;
        let status: String = row.try_get("status").ok()?;
        Some(Task {
            task_id: row.try_get("task_id").ok()?,
            user_id: row.try_get("user_id").ok()?,
            kind,
            description: row.try_get("task_description").unwrap_or_default(),
            status: TaskStatus::parse(&status)?,
            screenshot_path: row.try_get("screenshot_path").ok().flatten(),
            created_at: row
                .try_get::<DateTime<Utc>, _>("created_at")
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    /// Insert a pending task and bump the owner's pending counter in one
    /// transaction.
    pub async fn create(&self, user_id: i64, kind: TaskKind, description: &str) -> Result<i64> {
        let offer_id = match kind {
            TaskKind::Promo { offer_id } => Some(offer_id),
            _ => None,
        };

        let mut tx = self.pool.begin().await?;
        let task_id = sqlx::query(
            "INSERT INTO tasks (user_id, task_type, offer_id, task_description, status, created_at)
             VALUES (?, ?, ?, ?, 'pending', ?)",
        )
        .bind(user_id)
        .bind(kind.tag())
        .bind(offer_id)
        .bind(description)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to insert task")?
        .last_insert_rowid();

        sqlx::query("UPDATE users SET pending_tasks = pending_tasks + 1 WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(task_id)
    }

    pub async fn get(&self, task_id: i64) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch task")?;
        Ok(row.as_ref().and_then(Self::row_to_task))
    }

    pub async fn approve(&self, task_id: i64, user_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
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

    pub async fn decline(&self, task_id: i64, user_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE tasks SET status = 'declined' WHERE task_id = ?")
            .bind(task_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE users SET pending_tasks = MAX(pending_tasks - 1, 0) WHERE user_id = ?",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Cancel the user's most recent *pending* task. Tasks already sent for
    /// review stay untouched.
    pub async fn cancel_latest_pending(&self, user_id: i64) -> Result<bool> {
        let task_id: Option<i64> = sqlx::query_scalar(
            "SELECT task_id FROM tasks
             WHERE user_id = ? AND status = 'pending'
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(task_id) = task_id else {
            return Ok(false);
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE users SET pending_tasks = MAX(pending_tasks - 1, 0) WHERE user_id = ?",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn latest_pending_id(&self, user_id: i64) -> Result<Option<i64>> {
        let id = sqlx::query_scalar(
            "SELECT task_id FROM tasks
             WHERE user_id = ? AND status = 'pending'
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn attach_screenshot(&self, task_id: i64, path: &str) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET screenshot_path = ?, status = 'awaiting_review' WHERE task_id = ?",
        )
        .bind(path)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .context("Failed to attach screenshot")?;
        Ok(())
    }

    /// Oldest submission still waiting for an admin verdict.
    pub async fn next_awaiting_review(&self) -> Result<Option<Task>> {
        let row = sqlx::query(
            "SELECT * FROM tasks
             WHERE status = 'awaiting_review'
             ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().and_then(Self::row_to_task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;
    use crate::repositories::user_repo::UserRepository;

    async fn setup() -> (TaskRepository, UserRepository) {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let users = UserRepository::new(pool.clone());
        users.get_or_create(1, None, None, None, None).await.unwrap();
        (TaskRepository::new(pool), users)
    }

    #[tokio::test]
    async fn create_and_approve_updates_counters() {
        let (tasks, users) = setup().await;
        let task_id = tasks.create(1, TaskKind::Meme, "panel").await.unwrap();
        assert_eq!(users.get(1).await.unwrap().unwrap().pending_tasks, 1);

        tasks.approve(task_id, 1).await.unwrap();
        let user = users.get(1).await.unwrap().unwrap();
        assert_eq!(user.pending_tasks, 0);
        assert_eq!(user.completed_tasks, 1);
        assert_eq!(
            tasks.get(task_id).await.unwrap().unwrap().status,
            TaskStatus::Approved
        );
    }

    #[tokio::test]
    async fn cancel_only_removes_pending_tasks() {
        let (tasks, users) = setup().await;
        let reviewed = tasks.create(1, TaskKind::Text, "a").await.unwrap();
        tasks.attach_screenshot(reviewed, "shots/1.jpg").await.unwrap();

        // Nothing pending anymore, so cancel is a no-op.
        assert!(!tasks.cancel_latest_pending(1).await.unwrap());
        assert!(tasks.get(reviewed).await.unwrap().is_some());

        let pending = tasks.create(1, TaskKind::Text, "b").await.unwrap();
        assert!(tasks.cancel_latest_pending(1).await.unwrap());
        assert!(tasks.get(pending).await.unwrap().is_none());
        assert!(tasks.get(reviewed).await.unwrap().is_some());

        let user = users.get(1).await.unwrap().unwrap();
        assert!(user.pending_tasks >= 0);
    }

    #[tokio::test]
    async fn pending_counter_never_goes_negative() {
        let (tasks, users) = setup().await;
        let task_id = tasks.create(1, TaskKind::Repost, "r").await.unwrap();
        tasks.decline(task_id, 1).await.unwrap();
        // A second decline of the same row must not underflow the counter.
        tasks.decline(task_id, 1).await.unwrap();
        assert_eq!(users.get(1).await.unwrap().unwrap().pending_tasks, 0);
    }

    #[tokio::test]
    async fn screenshot_moves_task_to_review_queue() {
        let (tasks, _) = setup().await;
        let task_id = tasks.create(1, TaskKind::Meme, "panel").await.unwrap();
        tasks.attach_screenshot(task_id, "shots/2.jpg").await.unwrap();

        let next = tasks.next_awaiting_review().await.unwrap().unwrap();
        assert_eq!(next.task_id, task_id);
        assert_eq!(next.status, TaskStatus::AwaitingReview);
        assert_eq!(next.screenshot_path.as_deref(), Some("shots/2.jpg"));
    }
}
