use sqlx::SqlitePool;
use tracing::info;

use promoshare_db::models::{Task, TaskKind};
use promoshare_db::repositories::{ChatRepository, TaskRepository, TemplateRepository, UserRepository};

use crate::error::ServiceError;
use crate::texts;

/// Cap on "where to post" suggestions handed out with a task.
const MAX_TASK_CHATS: i64 = 5;

/// Content-task issuance and completion. Mirrors the redemption approval
/// tail, minus the credit debit.
#[derive(Clone)]
pub struct TaskService {
    users: UserRepository,
    tasks: TaskRepository,
    templates: TemplateRepository,
    chats: ChatRepository,
    bot_username: String,
    repost_target: String,
}

#[derive(Debug)]
pub struct MemeHandout {
    pub file_path: String,
    pub panel: String,
    pub chats: Vec<String>,
}

#[derive(Debug)]
pub struct TextHandout {
    pub body: String,
    pub chats: Vec<String>,
}

impl TaskService {
    pub fn new(pool: SqlitePool, bot_username: String, repost_target: String) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            tasks: TaskRepository::new(pool.clone()),
            templates: TemplateRepository::new(pool.clone()),
            chats: ChatRepository::new(pool),
            bot_username,
            repost_target,
        }
    }

    async fn promo_code_of(&self, user_id: i64) -> Result<String, ServiceError> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        Ok(user.promo_code)
    }

    async fn meme_handout(&self, user_id: i64) -> Result<MemeHandout, ServiceError> {
        let meme = self
            .templates
            .random_meme()
            .await?
            .ok_or(ServiceError::NotFound("meme template"))?;
        let panel = texts::task_panel(&self.bot_username, &self.promo_code_of(user_id).await?);
        let chats = self.chats.random(MAX_TASK_CHATS).await?;
        Ok(MemeHandout {
            file_path: meme.file_path,
            panel,
            chats,
        })
    }

    async fn text_handout(&self, user_id: i64) -> Result<TextHandout, ServiceError> {
        let template = self
            .templates
            .random_text()
            .await?
            .ok_or(ServiceError::NotFound("text template"))?;
        let body = texts::task_text(
            &template.text,
            &self.bot_username,
            &self.promo_code_of(user_id).await?,
        );
        let chats = self.chats.random(MAX_TASK_CHATS).await?;
        Ok(TextHandout { body, chats })
    }

    pub async fn issue_meme(&self, user_id: i64) -> Result<(i64, MemeHandout), ServiceError> {
        let handout = self.meme_handout(user_id).await?;
        let task_id = self.tasks.create(user_id, TaskKind::Meme, &handout.panel).await?;
        info!("Issued meme task {} to user {}", task_id, user_id);
        Ok((task_id, handout))
    }

    /// Re-roll the template for an already-issued task; no new task row.
    pub async fn reroll_meme(&self, user_id: i64) -> Result<MemeHandout, ServiceError> {
        self.meme_handout(user_id).await
    }

    pub async fn issue_text(&self, user_id: i64) -> Result<(i64, TextHandout), ServiceError> {
        let handout = self.text_handout(user_id).await?;
        let task_id = self.tasks.create(user_id, TaskKind::Text, &handout.body).await?;
        info!("Issued text task {} to user {}", task_id, user_id);
        Ok((task_id, handout))
    }

    pub async fn reroll_text(&self, user_id: i64) -> Result<TextHandout, ServiceError> {
        self.text_handout(user_id).await
    }

    pub async fn issue_repost(&self, user_id: i64) -> Result<(i64, TextHandout), ServiceError> {
        let body = format!(
            "Please repost our channel {} into one of the chats below:",
            self.repost_target
        );
        let task_id = self.tasks.create(user_id, TaskKind::Repost, &body).await?;
        let chats = self.chats.random(MAX_TASK_CHATS).await?;
        Ok((task_id, TextHandout { body, chats }))
    }

    /// "Back" from an issued task: drops the latest pending row only.
    pub async fn cancel_active(&self, user_id: i64) -> Result<bool, ServiceError> {
        Ok(self.tasks.cancel_latest_pending(user_id).await?)
    }

    /// Screenshot arrived: pending → awaiting_review on the latest pending
    /// task. Returns the task id for the admin notification.
    pub async fn submit_screenshot(&self, user_id: i64, path: &str) -> Result<i64, ServiceError> {
        let task_id = self
            .tasks
            .latest_pending_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound("active task"))?;
        self.tasks.attach_screenshot(task_id, path).await?;
        Ok(task_id)
    }

    pub async fn get(&self, task_id: i64) -> Result<Task, ServiceError> {
        self.tasks
            .get(task_id)
            .await?
            .ok_or(ServiceError::NotFound("task"))
    }

    pub async fn approve(&self, task_id: i64) -> Result<Task, ServiceError> {
        let task = self.get(task_id).await?;
        self.tasks.approve(task_id, task.user_id).await?;
        Ok(task)
    }

    pub async fn decline(&self, task_id: i64) -> Result<Task, ServiceError> {
        let task = self.get(task_id).await?;
        self.tasks.decline(task_id, task.user_id).await?;
        Ok(task)
    }

    pub async fn next_awaiting_review(&self) -> Result<Option<Task>, ServiceError> {
        Ok(self.tasks.next_awaiting_review().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promoshare_db::db::run_migrations;

    async fn setup() -> (TaskService, SqlitePool) {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let users = UserRepository::new(pool.clone());
        users.get_or_create(1, None, None, None, None).await.unwrap();
        let service = TaskService::new(
            pool.clone(),
            "promoshare_bot".to_string(),
            "@promoshare".to_string(),
        );
        (service, pool)
    }

    #[tokio::test]
    async fn issuing_without_templates_is_not_found() {
        let (service, _) = setup().await;
        assert!(matches!(
            service.issue_meme(1).await.unwrap_err(),
            ServiceError::NotFound("meme template")
        ));
        assert!(matches!(
            service.issue_text(1).await.unwrap_err(),
            ServiceError::NotFound("text template")
        ));
    }

    #[tokio::test]
    async fn text_task_embeds_the_users_promo_code() {
        let (service, pool) = setup().await;
        let templates = TemplateRepository::new(pool.clone());
        templates.add_text("Free scooters over here!").await.unwrap();
        let chats = ChatRepository::new(pool.clone());
        chats.add("@city_chat").await.unwrap();

        let (task_id, handout) = service.issue_text(1).await.unwrap();
        let user = UserRepository::new(pool.clone()).get(1).await.unwrap().unwrap();
        assert!(handout.body.contains(&user.promo_code));
        assert!(handout.body.contains("Free scooters over here!"));
        assert_eq!(handout.chats, vec!["@city_chat".to_string()]);

        let task = service.get(task_id).await.unwrap();
        assert_eq!(task.kind, TaskKind::Text);
    }

    #[tokio::test]
    async fn reroll_does_not_create_a_second_task() {
        let (service, pool) = setup().await;
        let templates = TemplateRepository::new(pool.clone());
        templates.add_text("template").await.unwrap();

        service.issue_text(1).await.unwrap();
        service.reroll_text(1).await.unwrap();
        service.reroll_text(1).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE user_id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn screenshot_submission_needs_a_pending_task() {
        let (service, pool) = setup().await;
        assert!(matches!(
            service.submit_screenshot(1, "shots/x.jpg").await.unwrap_err(),
            ServiceError::NotFound("active task")
        ));

        let templates = TemplateRepository::new(pool.clone());
        templates.add_text("template").await.unwrap();
        let (task_id, _) = service.issue_text(1).await.unwrap();

        let submitted = service.submit_screenshot(1, "shots/x.jpg").await.unwrap();
        assert_eq!(submitted, task_id);

        let next = service.next_awaiting_review().await.unwrap().unwrap();
        assert_eq!(next.task_id, task_id);
    }
}
