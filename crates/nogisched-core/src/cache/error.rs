use thiserror::Error;

/// Local storage failures. These never reach callers of `CacheStore` or
/// `SettingsStore`; they are logged and treated as "nothing stored".
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode or decode stored data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
