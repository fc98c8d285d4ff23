use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    /// Re-verify a referral's subscription at the end of the qualification
    /// window. `chat_id` is the referrer, `payload` the referral.
    LoyaltyCheck,
    /// One-shot re-engagement nudge after onboarding. `chat_id` is the
    /// user to remind, `payload` unused.
    Reminder,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::LoyaltyCheck => "loyalty_check",
            JobKind::Reminder => "reminder",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "loyalty_check" => Some(JobKind::LoyaltyCheck),
            "reminder" => Some(JobKind::Reminder),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: i64,
    pub kind: JobKind,
    pub chat_id: i64,
    pub payload: Option<i64>,
    pub due_at: DateTime<Utc>,
    pub fired: bool,
}
