/// Failure of the durable key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key-value store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("key-value store contents are not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
}

/// Simple string key-value persistence provided by the host.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}
