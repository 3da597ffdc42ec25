use std::sync::Arc;

use crate::{
    domain::{Campus, NotificationEvent},
    ports::PlatformApi,
    session::Session,
    Result,
};

/// Page size used by the platform web UI.
pub const DEFAULT_FETCH_LIMIT: u32 = 50;

/// Read-only view of a campus's current notification list.
#[derive(Clone)]
pub struct NotificationFetcher {
    api: Arc<dyn PlatformApi>,
    limit: u32,
}

impl NotificationFetcher {
    pub fn new(api: Arc<dyn PlatformApi>, limit: u32) -> Self {
        Self {
            api,
            limit: limit.max(1),
        }
    }

    /// Current notification set for `campus`.
    ///
    /// Fails with `Error::AuthExpired` when the platform rejects the session and
    /// `Error::Transient` for network/5xx failures.
    pub async fn fetch_notifications(
        &self,
        session: &Session,
        campus: &Campus,
    ) -> Result<Vec<NotificationEvent>> {
        let events = self
            .api
            .list_notifications(session.token(), campus, self.limit)
            .await?;
        tracing::debug!(campus = %campus.name, count = events.len(), "fetched notifications");
        Ok(events)
    }

    /// Most recent notification, if any.
    pub async fn fetch_latest(
        &self,
        session: &Session,
        campus: &Campus,
    ) -> Result<Option<NotificationEvent>> {
        let mut events = self
            .api
            .list_notifications(session.token(), campus, 1)
            .await?;
        Ok(if events.is_empty() {
            None
        } else {
            Some(events.swap_remove(0))
        })
    }
}
