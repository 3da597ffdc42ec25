/// Core error type for the notifier.
///
/// Adapter crates map their specific errors into this type so the poll loop
/// can decide between stopping, re-authenticating and skipping a tick.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Credentials were rejected by the platform. Retrying cannot succeed.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The platform no longer accepts the current session token.
    #[error("session expired")]
    AuthExpired,

    #[error("transient error: {0}")]
    Transient(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Only rejected credentials stop monitoring.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
