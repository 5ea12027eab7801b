use async_trait::async_trait;
use chrono::NaiveDate;
use engine_logging::{engine_error, engine_info, engine_warn};
use tokio_util::sync::CancellationToken;

use crate::extract::RecordExtractor;
use crate::settings::{ExtractSettings, WalkSettings};
use crate::store::FeedStore;
use crate::walker::{FeedView, FeedWalker};
use crate::{SessionError, SessionFailureKind, WalkReport};

/// A live automation session showing the feed.
#[async_trait]
pub trait FeedSession: FeedView {
    /// Navigate to the feed and wait until the first item is rendered.
    async fn open_feed(&mut self, cancel: &CancellationToken) -> Result<(), SessionError>;

    /// Tear the session down. Called exactly once.
    async fn release(self: Box<Self>) -> Result<(), SessionError>;
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn FeedSession>, SessionError>;
}

/// Owns a session until it is released.
///
/// Prefer [`SessionGuard::release`]. A guard dropped while still holding its
/// session hands the release to the current runtime.
pub struct SessionGuard {
    session: Option<Box<dyn FeedSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn FeedSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn session_mut(&mut self) -> Result<&mut dyn FeedSession, SessionError> {
        match self.session.as_deref_mut() {
            Some(session) => Ok(session),
            None => Err(SessionError::new(
                SessionFailureKind::Browser,
                "session already released",
            )),
        }
    }

    pub async fn release(mut self) -> Result<(), SessionError> {
        match self.session.take() {
            Some(session) => session.release().await,
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        engine_warn!("feed session dropped without release, releasing in the background");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = session.release().await {
                        engine_warn!("background session release failed: {err}");
                    }
                });
            }
            Err(_) => engine_error!("no runtime available to release the dropped feed session"),
        }
    }
}

/// Acquires a session, walks the feed once, and always releases the session.
pub struct SessionController {
    launcher: Box<dyn SessionLauncher>,
    extract: ExtractSettings,
    walk: WalkSettings,
    seed: Option<u64>,
}

impl SessionController {
    pub fn new(
        launcher: Box<dyn SessionLauncher>,
        extract: ExtractSettings,
        walk: WalkSettings,
    ) -> Self {
        Self {
            launcher,
            extract,
            walk,
            seed: None,
        }
    }

    /// Seed the walker's randomness for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub async fn harvest(
        &self,
        store: &dyn FeedStore,
        cutoff: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> Result<WalkReport, SessionError> {
        let mut report = WalkReport::default();
        self.harvest_into(store, cutoff, cancel, &mut report)
            .await?;
        Ok(report)
    }

    /// One session; records stored before a failure stay in `report`.
    pub async fn harvest_into(
        &self,
        store: &dyn FeedStore,
        cutoff: Option<NaiveDate>,
        cancel: &CancellationToken,
        report: &mut WalkReport,
    ) -> Result<(), SessionError> {
        let session = self.launcher.acquire().await?;
        engine_info!("feed session acquired");
        let mut guard = SessionGuard::new(session);

        let outcome = self.drive(&mut guard, store, cutoff, cancel, report).await;

        match guard.release().await {
            Ok(()) => engine_info!("feed session released"),
            Err(err) => engine_warn!("releasing the feed session failed: {err}"),
        }
        outcome
    }

    async fn drive(
        &self,
        guard: &mut SessionGuard,
        store: &dyn FeedStore,
        cutoff: Option<NaiveDate>,
        cancel: &CancellationToken,
        report: &mut WalkReport,
    ) -> Result<(), SessionError> {
        let session = guard.session_mut()?;
        session.open_feed(cancel).await?;

        let mut walker = FeedWalker::new(RecordExtractor::new(self.extract.clone()), self.walk.clone());
        if let Some(seed) = self.seed {
            walker = walker.with_seed(seed);
        }
        walker
            .walk_into(session, store, cutoff, cancel, report)
            .await
    }
}
