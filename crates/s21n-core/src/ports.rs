use std::time::Duration;

use async_trait::async_trait;

use crate::{
    domain::{Campus, Credentials, NotificationEvent},
    Result,
};

/// Access token returned by a successful authentication exchange.
#[derive(Clone)]
pub struct AuthToken {
    pub access_token: String,
    /// Lifetime advertised by the platform, if any.
    pub expires_in: Option<Duration>,
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Hexagonal port for the school platform.
///
/// Error contract:
/// - `authenticate`: `Error::Auth` when credentials are rejected, `Error::Transient` otherwise.
/// - data calls: `Error::AuthExpired` when the token is rejected, `Error::Transient` for
///   network/5xx failures.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthToken>;

    async fn list_campuses(&self, token: &str) -> Result<Vec<Campus>>;

    async fn list_notifications(
        &self,
        token: &str,
        campus: &Campus,
        limit: u32,
    ) -> Result<Vec<NotificationEvent>>;
}
