// Timestamps - instants are stored as INTEGER unix milliseconds

use chrono::{DateTime, SubsecRound, Utc};

use crate::error::{AppError, AppResult};

pub fn current_time_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

/// Drop everything finer than a millisecond, the resolution the store keeps.
pub fn truncate_to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(3)
}

pub fn from_millis(millis: i64) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        AppError::DatabaseError(format!("Stored timestamp {} is out of range", millis))
    })
}
