use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Conversational state per user. Multi-step input collection goes through
/// these states and nothing else; every handler matches on
/// (current state, inbound event) and terminal rejections reset to `Idle`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// User pressed "enter promo code" and owes us a code.
    AwaitingPromoCode,
    /// User pressed "done" on a task and owes us a screenshot.
    AwaitingScreenshot,
    // Admin console states.
    AwaitingMemeUpload,
    AwaitingMemeDeleteId,
    AwaitingTextTemplate,
    AwaitingTextDeleteId,
    AwaitingChatAdd,
    AwaitingChatDeleteIndex {
        chats: Vec<String>,
    },
    AwaitingOfferAdd,
    AwaitingOfferDeleteId,
    AwaitingBroadcastAll,
    AwaitingBroadcastUser,
    /// Admin approved a promo redemption and owes us the coupon code.
    AwaitingCouponCode {
        task_id: i64,
        user_id: i64,
    },
}

#[derive(Clone, Default)]
pub struct Sessions {
    inner: Arc<Mutex<HashMap<i64, SessionState>>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, user_id: i64) -> SessionState {
        self.inner
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set(&self, user_id: i64, state: SessionState) {
        self.inner.lock().await.insert(user_id, state);
    }

    pub async fn reset(&self, user_id: i64) {
        self.inner.lock().await.remove(&user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_default_to_idle() {
        let sessions = Sessions::new();
        assert_eq!(sessions.get(1).await, SessionState::Idle);

        sessions.set(1, SessionState::AwaitingPromoCode).await;
        assert_eq!(sessions.get(1).await, SessionState::AwaitingPromoCode);
        // Another user's state is untouched.
        assert_eq!(sessions.get(2).await, SessionState::Idle);

        sessions.reset(1).await;
        assert_eq!(sessions.get(1).await, SessionState::Idle);
    }
}
