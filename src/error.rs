use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Record for collection '{collection}' is missing its '{field}' key")]
    MissingKey { collection: String, field: String },

    #[error("Remote fetch failed: {0}")]
    RemoteFetch(String),

    #[cfg(feature = "remote")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Customer '{0}' not found")]
    CustomerNotFound(String),

    #[error("Customer '{customer}' has {accounts} accounts; a single lookup supports at most {cap}")]
    AccountCapExceeded {
        customer: String,
        accounts: usize,
        cap: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProfileError>;
