use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
    #[error("duration overflow: {0} days")]
    Overflow(i64),
}

impl StoreError {
    pub fn timestamp(raw: &str) -> Self { Self::Timestamp(raw.to_string()) }
}
