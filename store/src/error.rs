use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is unhealthy")]
    Unhealthy,
    #[error("key not found: {0}")]
    NotFound(String),
}
