use chrono::{Duration, Utc};
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{error, info};

use promoshare_db::models::{JobKind, ScheduledJob};

use crate::state::AppState;
use crate::texts;

/// Re-arm every job that has not fired yet. Overdue jobs fire immediately.
/// Called once at startup; crediting stays idempotent through the loyalty
/// ledger, so replaying a job that already ran is harmless.
pub async fn replay_pending(bot: &Bot, state: &AppState) -> anyhow::Result<usize> {
    let jobs = state.jobs.unfired().await?;
    let count = jobs.len();
    for job in jobs {
        arm(bot.clone(), state.clone(), job);
    }
    Ok(count)
}

/// Persist a job row and arm its in-memory timer. The row is written
/// first; losing the process after that point only delays the job until
/// the next startup replay.
pub async fn schedule(
    bot: &Bot,
    state: &AppState,
    kind: JobKind,
    chat_id: i64,
    payload: Option<i64>,
    delay: Duration,
) -> anyhow::Result<()> {
    let job = state
        .jobs
        .schedule(kind, chat_id, payload, Utc::now() + delay)
        .await?;
    arm(bot.clone(), state.clone(), job);
    Ok(())
}

pub fn arm(bot: Bot, state: AppState, job: ScheduledJob) {
    tokio::spawn(async move {
        let now = Utc::now();
        if job.due_at > now {
            let delay = (job.due_at - now).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;
        }
        execute(&bot, &state, &job).await;
    });
}

async fn execute(bot: &Bot, state: &AppState, job: &ScheduledJob) {
    match job.kind {
        JobKind::LoyaltyCheck => {
            if let Some(referral_id) = job.payload {
                run_loyalty_check(bot, state, job.chat_id, referral_id).await;
            }
        }
        JobKind::Reminder => {
            let _ = bot
                .send_message(ChatId(job.chat_id), texts::reminder())
                .parse_mode(ParseMode::Html)
                .await;
        }
    }

    if let Err(e) = state.jobs.mark_fired(job.id).await {
        error!("Failed to mark job {} fired: {}", job.id, e);
    }
}

/// End-of-window verification: still subscribed → ledger-guarded credit
/// and a note to the referrer; anything else is a silent no-op.
pub async fn run_loyalty_check(bot: &Bot, state: &AppState, referrer_id: i64, referral_id: i64) {
    info!(
        "Checking loyalty for referrer {} / referral {}",
        referrer_id, referral_id
    );

    let subscribed = state.subscription.force_check(bot, referral_id).await;
    if !subscribed {
        info!("Referral {} is not subscribed, no credit given", referral_id);
        return;
    }

    match state.referrals.grant_credit(referrer_id, referral_id).await {
        Ok(true) => {
            info!("Credited loyal referral {} -> {}", referral_id, referrer_id);
            let _ = bot
                .send_message(ChatId(referrer_id), texts::loyal_referral_notice())
                .parse_mode(ParseMode::Html)
                .await;
        }
        Ok(false) => {}
        Err(e) => error!(
            "Failed to credit loyal referral {}/{}: {}",
            referrer_id, referral_id, e
        ),
    }
}
