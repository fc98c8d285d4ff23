use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::utils::generate_promo_code;

pub async fn init_db(database_url: &str) -> Result<SqlitePool> {
    if !database_url.starts_with("sqlite:") {
        return Err(anyhow::anyhow!(
            "DATABASE_URL must start with sqlite: or sqlite://"
        ));
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(10));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("Failed to connect to SQLite")?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Idempotent schema bootstrap: base tables, additive column repairs
/// guarded by pragma_table_info, unique promo-code index, and a promo-code
/// backfill for rows that predate the column. Safe to run on every start.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY,
            username TEXT,
            first_name TEXT,
            last_name TEXT,
            ref_by INTEGER
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tasks (
            task_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER,
            task_type TEXT,
            task_description TEXT,
            status TEXT DEFAULT 'pending',
            screenshot_path TEXT,
            created_at TIMESTAMP,
            FOREIGN KEY(user_id) REFERENCES users(user_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create tasks table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS coupons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT,
            type TEXT,
            used INTEGER DEFAULT 0
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create coupons table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS meme_templates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT,
            text TEXT
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create meme_templates table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS text_templates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            text TEXT
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create text_templates table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS allowed_chats (
            chat_username TEXT PRIMARY KEY
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create allowed_chats table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS promo_offers (
            offer_id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            cost INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create promo_offers table")?;

    // Loyalty credit ledger: the UNIQUE pair is what makes crediting
    // at-most-once across the timer path and the reconciliation scan.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS loyalty_credits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            referrer_id INTEGER NOT NULL,
            referral_id INTEGER NOT NULL,
            credited_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(referrer_id, referral_id),
            FOREIGN KEY(referrer_id) REFERENCES users(user_id),
            FOREIGN KEY(referral_id) REFERENCES users(user_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create loyalty_credits table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS scheduled_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            chat_id INTEGER NOT NULL,
            payload INTEGER,
            due_at TIMESTAMP NOT NULL,
            fired INTEGER DEFAULT 0
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create scheduled_jobs table")?;

    // Additive column repairs for users tables created by older builds.
    let user_columns = [
        ("promo_code", "TEXT"),
        ("referrals_count", "INTEGER DEFAULT 0"),
        ("joined_date", "TIMESTAMP"),
        ("used_loyal", "INTEGER DEFAULT 0"),
        ("loyal_referrals", "INTEGER DEFAULT 0"),
        ("pending_tasks", "INTEGER DEFAULT 0"),
        ("completed_tasks", "INTEGER DEFAULT 0"),
    ];
    for (column, definition) in user_columns {
        ensure_column(pool, "users", column, definition).await?;
    }
    ensure_column(pool, "tasks", "offer_id", "INTEGER").await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_promo_code ON users(promo_code)",
    )
    .execute(pool)
    .await
    .context("Failed to create promo code index")?;

    backfill_promo_codes(pool).await?;

    Ok(())
}

async fn ensure_column(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<()> {
    let exists: bool = sqlx::query_scalar(&format!(
        "SELECT count(*) > 0 FROM pragma_table_info('{}') WHERE name = '{}'",
        table, column
    ))
    .fetch_one(pool)
    .await
    .unwrap_or(false);

    if !exists {
        tracing::info!("Applying schema repair: adding '{}' to {} table", column, table);
        if let Err(e) = sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            table, column, definition
        ))
        .execute(pool)
        .await
        {
            tracing::warn!("Failed to add {} column (might exist?): {}", column, e);
        }
    }

    Ok(())
}

/// Users created before the promo_code column existed get a code now, so
/// the "non-null after onboarding" invariant holds for the whole table.
async fn backfill_promo_codes(pool: &SqlitePool) -> Result<()> {
    let missing: Vec<i64> =
        sqlx::query_scalar("SELECT user_id FROM users WHERE promo_code IS NULL")
            .fetch_all(pool)
            .await
            .context("Failed to list users without promo codes")?;

    for user_id in missing {
        loop {
            let code = generate_promo_code();
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users WHERE promo_code = ?)",
            )
            .bind(&code)
            .fetch_one(pool)
            .await?;
            if taken {
                continue;
            }
            sqlx::query("UPDATE users SET promo_code = ? WHERE user_id = ?")
                .bind(&code)
                .bind(user_id)
                .execute(pool)
                .await?;
            tracing::info!("Backfilled promo code for user {}", user_id);
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let columns: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM pragma_table_info('users') WHERE name = 'promo_code'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(columns, 1);
    }

    #[tokio::test]
    async fn backfill_assigns_codes_to_legacy_rows() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        sqlx::query("INSERT INTO users (user_id, username) VALUES (1, 'legacy')")
            .execute(&pool)
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        let code: Option<String> =
            sqlx::query_scalar("SELECT promo_code FROM users WHERE user_id = 1")
                .fetch_one(&pool)
                .await
                .unwrap();
        let code = code.expect("backfill should have assigned a code");
        assert_eq!(code.len(), 6);
    }
}
