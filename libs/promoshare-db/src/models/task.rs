use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the user is asked to do. The promo variant carries the offer being
/// redeemed; content variants reference their template only through the
/// rendered description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Meme,
    Text,
    Repost,
    Promo { offer_id: i64 },
}

impl TaskKind {
    pub fn tag(&self) -> &'static str {
        match self {
            TaskKind::Meme => "meme",
            TaskKind::Text => "text",
            TaskKind::Repost => "repost",
            TaskKind::Promo { .. } => "promo",
        }
    }

    pub fn from_row(tag: &str, offer_id: Option<i64>) -> Option<Self> {
        match tag {
            "meme" => Some(TaskKind::Meme),
            "text" => Some(TaskKind::Text),
            "repost" => Some(TaskKind::Repost),
            "promo" => offer_id.map(|offer_id| TaskKind::Promo { offer_id }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    AwaitingReview,
    Approved,
    Declined,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::AwaitingReview => "awaiting_review",
            TaskStatus::Approved => "approved",
            TaskStatus::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "awaiting_review" => Some(TaskStatus::AwaitingReview),
            "approved" => Some(TaskStatus::Approved),
            "declined" => Some(TaskStatus::Declined),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: i64,
    pub user_id: i64,
    pub kind: TaskKind,
    pub description: String,
    pub status: TaskStatus,
    pub screenshot_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_tags() {
        assert_eq!(TaskKind::from_row("meme", None), Some(TaskKind::Meme));
        assert_eq!(
            TaskKind::from_row("promo", Some(7)),
            Some(TaskKind::Promo { offer_id: 7 })
        );
        // A promo tag without its offer reference is unreadable, not a panic.
        assert_eq!(TaskKind::from_row("promo", None), None);
        assert_eq!(TaskKind::from_row("banana", None), None);
    }
}
