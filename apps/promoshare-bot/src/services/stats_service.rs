use chrono::{DateTime, Datelike, Duration, Utc};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::info;

use promoshare_db::repositories::UserRepository;

use crate::error::ServiceError;

#[derive(Clone)]
pub struct StatsService {
    pool: SqlitePool,
    users: UserRepository,
    exports_dir: PathBuf,
    db_path: PathBuf,
}

pub struct StatsSummary {
    pub total: i64,
    pub today: i64,
    pub week: i64,
}

pub struct DbStatus {
    pub file_size: u64,
    pub user_count: i64,
    pub integrity_ok: bool,
    pub recent: Vec<(i64, Option<String>, DateTime<Utc>)>,
}

impl StatsService {
    pub fn new(pool: SqlitePool, exports_dir: PathBuf, db_path: PathBuf) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            pool,
            exports_dir,
            db_path,
        }
    }

    pub async fn summary(&self) -> Result<StatsSummary, ServiceError> {
        let (today_start, week_start) = date_range(Utc::now());
        Ok(StatsSummary {
            total: self.users.count_all().await?,
            today: self.users.count_joined_since(today_start).await?,
            week: self.users.count_joined_since(week_start).await?,
        })
    }

    /// Dump the user table as CSV with a stable column order and return the
    /// file path. Callers send it back as a document.
    pub async fn export_users_csv(&self) -> Result<PathBuf, ServiceError> {
        let users = self.users.list_all().await?;

        let mut out = String::from("user_id,username,first_name,last_name,ref_by,joined_date\n");
        for user in &users {
            let row = [
                user.user_id.to_string(),
                user.username.clone().unwrap_or_default(),
                user.first_name.clone().unwrap_or_default(),
                user.last_name.clone().unwrap_or_default(),
                user.ref_by.map(|r| r.to_string()).unwrap_or_default(),
                user.joined_date.to_rfc3339(),
            ];
            let line: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }

        std::fs::create_dir_all(&self.exports_dir)
            .map_err(|e| anyhow::anyhow!("Failed to create exports dir: {}", e))?;
        let filename = format!("users_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = self.exports_dir.join(filename);
        std::fs::write(&path, out)
            .map_err(|e| anyhow::anyhow!("Failed to write users export: {}", e))?;

        info!("Exported {} users to {}", users.len(), path.display());
        Ok(path)
    }

    pub async fn db_status(&self) -> Result<DbStatus, ServiceError> {
        let integrity: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&self.pool)
            .await?;

        let recent = self
            .users
            .latest(3)
            .await?
            .into_iter()
            .map(|u| (u.user_id, u.username, u.joined_date))
            .collect();

        Ok(DbStatus {
            file_size: std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0),
            user_count: self.users.count_all().await?,
            integrity_ok: integrity == "ok",
            recent,
        })
    }
}

/// (start of today, start of the current ISO week), both UTC midnight.
pub fn date_range(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    let week_start = today_start - Duration::days(now.weekday().num_days_from_monday() as i64);
    (today_start, week_start)
}

fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Strip the sqlite URL scheme down to a filesystem path for size checks.
pub fn db_file_path(database_url: &str) -> PathBuf {
    let raw = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    Path::new(raw).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use promoshare_db::db::run_migrations;

    #[test]
    fn week_starts_on_monday() {
        // 2026-08-05 is a Wednesday.
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 15, 30, 0).unwrap();
        let (today, week) = date_range(now);
        assert_eq!(today, Utc.with_ymd_and_hms(2026, 8, 5, 0, 0, 0).unwrap());
        assert_eq!(week, Utc.with_ymd_and_hms(2026, 8, 3, 0, 0, 0).unwrap());
    }

    #[test]
    fn csv_fields_with_commas_are_quoted() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn db_path_strips_scheme() {
        assert_eq!(db_file_path("sqlite://data/bot.db"), PathBuf::from("data/bot.db"));
        assert_eq!(db_file_path("sqlite:bot.db"), PathBuf::from("bot.db"));
    }

    #[tokio::test]
    async fn export_has_stable_header_and_one_row_per_user() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let users = UserRepository::new(pool.clone());
        users
            .get_or_create(1, Some("alice"), Some("Alice"), None, None)
            .await
            .unwrap();
        users
            .get_or_create(2, Some("bob"), Some("Bob, Jr."), Some("Smith"), Some(1))
            .await
            .unwrap();

        let dir = std::env::temp_dir().join("promoshare-export-test");
        let service = StatsService::new(pool, dir, PathBuf::from("unused.db"));
        let path = service.export_users_csv().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "user_id,username,first_name,last_name,ref_by,joined_date"
        );
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("1,alice,Alice,"));
        assert!(rows[1].starts_with("2,bob,\"Bob, Jr.\",Smith,1,"));

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn db_status_reports_integrity() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let service = StatsService::new(
            pool,
            std::env::temp_dir(),
            PathBuf::from("missing.db"),
        );
        let status = service.db_status().await.unwrap();
        assert!(status.integrity_ok);
        assert_eq!(status.user_count, 0);
        assert_eq!(status.file_size, 0);
    }
}
