#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use harvester_core::WalkLimits;
use harvester_engine::{
    ExtractSettings, FeedSession, FeedView, ItemSnapshot, ScrollSettings, SessionError,
    SessionFailureKind, SessionLauncher, WalkSettings,
};
use tokio_util::sync::CancellationToken;

pub const PROFILE: &str = "https://feed.example/@someone";

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

/// A feed item as the live page renders it, with a human-readable time.
pub fn item_html(id: &str, body: &str, title_time: &str) -> String {
    format!(
        r#"<div class="status">
  <div class="status__wrapper" data-id="{id}">
    <a class="display-name" href="/@someone">Some One</a>
    <span class="handle">@someone</span>
    <a class="status__relative-time" href="/@someone/posts/{id}"><time title="{title_time}">2h</time></a>
    <div class="status__content"><p>{body}</p></div>
    <div class="status__actions">
      <span data-testid="comment-count">3</span>
      <span data-testid="repost-count">1,020</span>
      <span data-testid="like-count">12,345</span>
    </div>
  </div>
</div>"#
    )
}

/// A minimal item carrying only a machine-readable time.
pub fn machine_item_html(id: &str, body: &str, rfc3339: &str) -> String {
    format!(
        r#"<div class="status"><div class="status__wrapper" data-id="{id}"><time datetime="{rfc3339}">now</time><div class="status__content"><p>{body}</p></div></div></div>"#
    )
}

pub fn endless_item(index: usize) -> String {
    let base = Utc.with_ymd_and_hms(2025, 7, 6, 12, 0, 0).unwrap();
    let at = base - ChronoDuration::minutes(10 * index as i64);
    machine_item_html(&format!("e{index}"), &format!("endless item {index}"), &at.to_rfc3339())
}

pub fn extract_settings() -> ExtractSettings {
    ExtractSettings {
        profile_url: PROFILE.to_string(),
        ..ExtractSettings::default()
    }
}

pub fn limits(cap: u32, no_progress: u32, after_target: u32) -> WalkLimits {
    WalkLimits {
        max_scroll_iterations: cap,
        max_no_progress_rounds: no_progress,
        rounds_after_target: after_target,
    }
}

pub fn walk_settings(limits: WalkLimits) -> WalkSettings {
    WalkSettings {
        limits,
        scroll: ScrollSettings::instant(),
    }
}

/// Counters shared between a scripted feed and the test that built it.
#[derive(Clone, Default)]
pub struct FeedLog {
    pub opened: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
    pub scrolls: Arc<AtomicUsize>,
}

impl FeedLog {
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

enum ItemSource {
    Fixed(Vec<String>),
    Endless,
}

/// In-memory feed: `initial` items are rendered up front and each scroll
/// reveals `batch` more on the next enumeration.
pub struct ScriptedFeed {
    source: ItemSource,
    visible: usize,
    batch: usize,
    offset: f64,
    scrolled: bool,
    enumerations: usize,
    fail_at_enumeration: Option<usize>,
    fail_open: Option<SessionFailureKind>,
    pub log: FeedLog,
}

impl ScriptedFeed {
    pub fn fixed(items: Vec<String>) -> Self {
        let visible = items.len();
        Self::new(ItemSource::Fixed(items), visible, 0)
    }

    pub fn paged(items: Vec<String>, initial: usize, batch: usize) -> Self {
        Self::new(ItemSource::Fixed(items), initial, batch)
    }

    pub fn endless(initial: usize, batch: usize) -> Self {
        Self::new(ItemSource::Endless, initial, batch)
    }

    fn new(source: ItemSource, visible: usize, batch: usize) -> Self {
        Self {
            source,
            visible,
            batch,
            offset: 0.0,
            scrolled: false,
            enumerations: 0,
            fail_at_enumeration: None,
            fail_open: None,
            log: FeedLog::default(),
        }
    }

    /// The n-th enumeration (1-based) fails like a crashed renderer.
    pub fn failing_at(mut self, enumeration: usize) -> Self {
        self.fail_at_enumeration = Some(enumeration);
        self
    }

    pub fn failing_open(mut self, kind: SessionFailureKind) -> Self {
        self.fail_open = Some(kind);
        self
    }

    pub fn with_log(mut self, log: FeedLog) -> Self {
        self.log = log;
        self
    }

    fn available(&self) -> usize {
        match &self.source {
            ItemSource::Fixed(items) => items.len(),
            ItemSource::Endless => usize::MAX,
        }
    }

    fn item(&self, index: usize) -> Option<String> {
        match &self.source {
            ItemSource::Fixed(items) => items.get(index).cloned(),
            ItemSource::Endless => Some(endless_item(index)),
        }
    }
}

#[async_trait]
impl FeedView for ScriptedFeed {
    async fn rendered_items(&mut self) -> Result<Vec<ItemSnapshot>, SessionError> {
        self.enumerations += 1;
        if self.fail_at_enumeration == Some(self.enumerations) {
            return Err(SessionError::new(
                SessionFailureKind::Browser,
                "renderer crashed",
            ));
        }
        if self.scrolled {
            self.visible = self.visible.saturating_add(self.batch).min(self.available());
            self.scrolled = false;
        }
        let visible = self.visible.min(self.available());
        Ok((0..visible)
            .filter_map(|index| self.item(index))
            .map(ItemSnapshot::new)
            .collect())
    }

    async fn viewport_height(&mut self) -> Result<f64, SessionError> {
        Ok(1000.0)
    }

    async fn scroll_offset(&mut self) -> Result<f64, SessionError> {
        Ok(self.offset)
    }

    async fn scroll_to(&mut self, offset: f64) -> Result<(), SessionError> {
        self.offset = offset;
        self.scrolled = true;
        self.log.scrolls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl FeedSession for ScriptedFeed {
    async fn open_feed(&mut self, _cancel: &CancellationToken) -> Result<(), SessionError> {
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        match self.fail_open {
            Some(kind) => Err(SessionError::new(kind, "scripted open failure")),
            None => Ok(()),
        }
    }

    async fn release(self: Box<Self>) -> Result<(), SessionError> {
        self.log.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type FeedFactory = dyn Fn(usize) -> Result<ScriptedFeed, SessionError> + Send + Sync;

/// Hands out scripted feeds; the factory gets the 1-based acquisition number.
pub struct ScriptedLauncher {
    make: Box<FeedFactory>,
    pub acquisitions: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    pub fn new(
        make: impl Fn(usize) -> Result<ScriptedFeed, SessionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            make: Box::new(make),
            acquisitions: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    async fn acquire(&self) -> Result<Box<dyn FeedSession>, SessionError> {
        let attempt = self.acquisitions.fetch_add(1, Ordering::SeqCst) + 1;
        let feed = (self.make)(attempt)?;
        Ok(Box::new(feed))
    }
}
