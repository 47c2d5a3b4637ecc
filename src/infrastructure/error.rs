use crate::domain::activation::SlotIndexOutOfRange;
use crate::domain::generator::ScheduleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("notification permission denied")]
    NotificationPermissionDenied,
    #[error("notification error: {0}")]
    Notification(String),
    #[error(transparent)]
    SlotIndex(#[from] SlotIndexOutOfRange),
}

impl InfraError {
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Json(_) | Self::Sqlite(_))
    }
}
