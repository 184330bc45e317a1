use crate::domain::DeviceId;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid stored value: {0}")]
    Corrupt(String),
}

#[derive(thiserror::Error, Debug)]
pub enum AnalyticsError {
    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),
    #[error("invalid rate: {0}")]
    InvalidRate(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
