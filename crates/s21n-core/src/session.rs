//! Platform session lifecycle: authenticate lazily, cache the token, renew on
//! expiry or after a downstream authorization failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::{domain::Credentials, ports::PlatformApi, Result};

/// Lifetime assumed when the platform does not advertise `expires_in`.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(10 * 60 * 60);

/// Renew this long before the advertised expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// An authenticated, time-bounded platform token.
#[derive(Clone)]
pub struct Session {
    token: String,
    expires_at: Instant,
}

impl Session {
    pub fn new(token: impl Into<String>, ttl: Duration) -> Self {
        Self {
            token: token.into(),
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Owns the credentials and the cached session for one monitoring run.
pub struct SessionManager {
    api: Arc<dyn PlatformApi>,
    credentials: Credentials,
    session: Option<Session>,
    authentications: u64,
}

impl SessionManager {
    pub fn new(api: Arc<dyn PlatformApi>, credentials: Credentials) -> Self {
        Self {
            api,
            credentials,
            session: None,
            authentications: 0,
        }
    }

    /// Return the cached session if still valid, otherwise authenticate.
    ///
    /// `Error::Auth` (rejected credentials) is returned as-is and never retried here.
    pub async fn ensure_valid_session(&mut self) -> Result<Session> {
        if let Some(s) = self.session.as_ref().filter(|s| s.is_valid()) {
            return Ok(s.clone());
        }

        self.session = None;
        let session = self.authenticate().await?;
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Drop the cached session; the next `ensure_valid_session` re-authenticates.
    pub fn invalidate(&mut self) {
        if self.session.take().is_some() {
            tracing::info!("platform session invalidated");
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_valid)
    }

    /// Number of authentication exchanges performed so far.
    pub fn authentications(&self) -> u64 {
        self.authentications
    }

    async fn authenticate(&mut self) -> Result<Session> {
        tracing::info!(login = %self.credentials.login, "authenticating with platform");
        self.authentications += 1;

        let token = self.api.authenticate(&self.credentials).await.map_err(|e| {
            tracing::warn!("platform authentication failed: {e}");
            e
        })?;

        let ttl = token
            .expires_in
            .unwrap_or(DEFAULT_SESSION_TTL)
            .saturating_sub(EXPIRY_SKEW);
        tracing::info!(ttl_secs = ttl.as_secs(), "platform session established");
        Ok(Session::new(token.access_token, ttl))
    }
}
