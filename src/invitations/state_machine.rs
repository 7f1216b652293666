// Request lifecycle: pending -> accepted | denied | cancelled, all terminal

use crate::error::{AppError, AppResult};
use crate::models::{RequestAction, RequestStatus};

/// The single transition table consulted by accept, deny and cancel.
pub fn transition(current: RequestStatus, action: RequestAction) -> AppResult<RequestStatus> {
    match (current, action) {
        (RequestStatus::Pending, RequestAction::Accept) => Ok(RequestStatus::Accepted),
        (RequestStatus::Pending, RequestAction::Deny) => Ok(RequestStatus::Denied),
        (RequestStatus::Pending, RequestAction::Cancel) => Ok(RequestStatus::Cancelled),
        (from, action) => Err(AppError::InvalidTransition { from, action }),
    }
}

impl RequestStatus {
    pub fn apply(self, action: RequestAction) -> AppResult<RequestStatus> {
        transition(self, action)
    }
}
