//! The poll loop: session → fetch → diff → dispatch, once per tick.
//!
//! State machine: `Starting -> Polling -> (Polling | AuthRetry | Stopped)`.
//! - `AuthExpired` from a fetch: invalidate, re-authenticate once, retry the fetch
//!   once; a second rejection makes the tick count as transient-failed.
//! - Transient failures skip the tick without touching the seen set.
//! - Rejected credentials stop the loop for good.
//!
//! The next tick is scheduled relative to the end of the previous one, so slow
//! ticks never overlap.

use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    diff::DiffEngine,
    dispatcher::Dispatcher,
    domain::{Campus, NotificationEvent},
    errors::Error,
    fetcher::NotificationFetcher,
    session::SessionManager,
    Result,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollState {
    Starting,
    Polling,
    AuthRetry,
    Stopped,
}

impl PollState {
    pub fn label(self) -> &'static str {
        match self {
            PollState::Starting => "starting",
            PollState::Polling => "polling",
            PollState::AuthRetry => "re-authenticating",
            PollState::Stopped => "stopped",
        }
    }
}

/// Result of one tick that did not stop the loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// First successful fetch: ids recorded, nothing delivered.
    Seeded { seen: usize },
    Checked {
        new: usize,
        delivered: usize,
        failed: usize,
    },
    /// Transient failure; seen set and session untouched.
    Skipped { reason: String },
}

/// Read-only view of a running loop, published after every tick.
#[derive(Clone, Debug)]
pub struct PollSnapshot {
    pub state: PollState,
    pub campus: Campus,
    pub interval: Duration,
    pub started_at: DateTime<Local>,
    pub last_check: Option<DateTime<Local>>,
    pub checks: u64,
    pub delivered: u64,
    pub delivery_failures: u64,
    pub tick_errors: u64,
    pub seen: usize,
    pub authentications: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct PollStats {
    last_check: Option<DateTime<Local>>,
    checks: u64,
    delivered: u64,
    delivery_failures: u64,
    tick_errors: u64,
    last_error: Option<String>,
}

/// One monitored campus under one session.
///
/// All run state (session, seen set, counters) lives here; restarting
/// monitoring means building a new `PollLoop`.
pub struct PollLoop {
    campus: Campus,
    interval: Duration,
    session: SessionManager,
    fetcher: NotificationFetcher,
    diff: DiffEngine,
    dispatcher: Dispatcher,
    state: PollState,
    started_at: DateTime<Local>,
    stats: PollStats,
}

impl PollLoop {
    pub fn new(
        campus: Campus,
        interval: Duration,
        session: SessionManager,
        fetcher: NotificationFetcher,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            campus,
            interval,
            session,
            fetcher,
            diff: DiffEngine::new(),
            dispatcher,
            state: PollState::Starting,
            started_at: Local::now(),
            stats: PollStats::default(),
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn campus(&self) -> &Campus {
        &self.campus
    }

    pub fn diff_engine(&self) -> &DiffEngine {
        &self.diff
    }

    pub fn snapshot(&self) -> PollSnapshot {
        PollSnapshot {
            state: self.state,
            campus: self.campus.clone(),
            interval: self.interval,
            started_at: self.started_at,
            last_check: self.stats.last_check,
            checks: self.stats.checks,
            delivered: self.stats.delivered,
            delivery_failures: self.stats.delivery_failures,
            tick_errors: self.stats.tick_errors,
            seen: self.diff.seen().len(),
            authentications: self.session.authentications(),
            last_error: self.stats.last_error.clone(),
        }
    }

    /// Drive ticks until cancelled or the credentials are rejected.
    ///
    /// The first tick runs immediately. On rejected credentials the operator gets
    /// exactly one message and the error is returned.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
        status: watch::Sender<PollSnapshot>,
    ) -> Result<()> {
        tracing::info!(
            campus = %self.campus.name,
            interval_secs = self.interval.as_secs(),
            "monitoring started"
        );
        status.send_replace(self.snapshot());

        loop {
            if let Err(e) = self.tick().await {
                status.send_replace(self.snapshot());
                tracing::error!(campus = %self.campus.name, "monitoring stopped: {e}");
                let msg = format!(
                    "⛔ Monitoring stopped: the platform rejected the login or password ({e}).\n\
Update the credentials and start monitoring again."
                );
                if let Err(de) = self.dispatcher.notify_operator(&msg).await {
                    tracing::warn!("failed to notify operator: {de}");
                }
                return Err(e);
            }
            status.send_replace(self.snapshot());

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }

        self.state = PollState::Stopped;
        status.send_replace(self.snapshot());
        tracing::info!(campus = %self.campus.name, "monitoring cancelled");
        Ok(())
    }

    /// One poll-fetch-diff-dispatch pass.
    ///
    /// Returns `Err` only for rejected credentials; everything else is folded
    /// into the returned outcome.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        self.stats.checks += 1;
        self.stats.last_check = Some(Local::now());

        let events = match self.fetch_with_reauth().await {
            Ok(events) => events,
            Err(e) if e.is_fatal() => {
                self.state = PollState::Stopped;
                self.stats.last_error = Some(e.to_string());
                return Err(e);
            }
            Err(e) => {
                self.state = PollState::Polling;
                self.stats.tick_errors += 1;
                self.stats.last_error = Some(e.to_string());
                tracing::warn!(campus = %self.campus.name, "tick skipped: {e}");
                return Ok(TickOutcome::Skipped {
                    reason: e.to_string(),
                });
            }
        };
        self.state = PollState::Polling;

        let seeding = self.diff.is_first_run();
        let fresh = self.diff.apply(events);
        if seeding {
            return Ok(TickOutcome::Seeded {
                seen: self.diff.seen().len(),
            });
        }

        if fresh.is_empty() {
            tracing::debug!(campus = %self.campus.name, "no new notifications");
        } else {
            tracing::info!(campus = %self.campus.name, count = fresh.len(), "new notifications");
        }

        let (delivered, failed) = self.dispatch_all(&fresh).await;
        Ok(TickOutcome::Checked {
            new: fresh.len(),
            delivered,
            failed,
        })
    }

    async fn fetch_with_reauth(&mut self) -> Result<Vec<NotificationEvent>> {
        let session = self.session.ensure_valid_session().await?;
        match self
            .fetcher
            .fetch_notifications(&session, &self.campus)
            .await
        {
            Err(Error::AuthExpired) => {}
            other => return other,
        }

        self.state = PollState::AuthRetry;
        tracing::warn!(campus = %self.campus.name, "session rejected, re-authenticating once");
        self.session.invalidate();

        let session = self.session.ensure_valid_session().await?;
        match self
            .fetcher
            .fetch_notifications(&session, &self.campus)
            .await
        {
            Err(Error::AuthExpired) => {
                self.session.invalidate();
                Err(Error::Transient(
                    "session rejected again right after re-authentication".to_string(),
                ))
            }
            other => other,
        }
    }

    async fn dispatch_all(&mut self, events: &[NotificationEvent]) -> (usize, usize) {
        let mut delivered = 0usize;
        let mut failed = 0usize;
        for event in events {
            match self.dispatcher.deliver(event).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(id = %event.id, "dropping notification: {e}");
                }
            }
        }
        self.stats.delivered += delivered as u64;
        self.stats.delivery_failures += failed as u64;
        (delivered, failed)
    }
}
