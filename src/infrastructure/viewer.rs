// Viewer context - who is performing the current operation

use uuid::Uuid;

use crate::core::UserId;
use crate::error::{AppError, AppResult};

/// Session port consumed by every write path. Authentication itself lives
/// outside the core; implementations only report the resolved user.
pub trait CurrentUser: Send + Sync {
    fn current_user(&self) -> Option<UserId>;

    fn require_user(&self) -> AppResult<UserId> {
        self.current_user().ok_or(AppError::Unauthenticated)
    }
}

#[derive(Debug, Clone)]
pub struct ViewerContext {
    pub user_id: Option<UserId>,
    pub request_id: String,
}

impl ViewerContext {
    pub fn new(user_id: UserId) -> Self {
        ViewerContext {
            user_id: Some(user_id),
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn anonymous() -> Self {
        ViewerContext {
            user_id: None,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

impl CurrentUser for ViewerContext {
    fn current_user(&self) -> Option<UserId> {
        self.user_id
    }
}
