use thiserror::Error;

/// Errors surfaced by the inbound approval API.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl ApprovalError {
    /// Returns `true` when the caller sent something structurally invalid.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedChain(_) | Self::InvalidAddress(_) | Self::InvalidRequest(_)
        )
    }
}

/// Errors from a block explorer API.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Explorer returned HTTP {0}")]
    Status(u16),

    #[error("Explorer API error: {0}")]
    Api(String),

    #[error("Failed to decode explorer response: {0}")]
    Decode(String),
}

impl ExplorerError {
    /// Transport-level failures worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::Api(msg) => msg.to_lowercase().contains("rate limit"),
            Self::Decode(_) => false,
        }
    }
}

/// Errors from an approval record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: i64, reason: String },

    #[error("Storage task failed: {0}")]
    Task(String),
}
