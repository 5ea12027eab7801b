//! Chromium-backed feed sessions over the DevTools protocol.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::scroll::pause;
use crate::session::{FeedSession, SessionLauncher};
use crate::settings::SessionSettings;
use crate::walker::FeedView;
use crate::{ItemSnapshot, SessionError, SessionFailureKind};

const MASK_WEBDRIVER: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

pub struct ChromeLauncher {
    settings: SessionSettings,
}

impl ChromeLauncher {
    pub fn new(settings: SessionSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self) -> Result<BrowserConfig, SessionError> {
        let (width, height) = self.settings.window_size;
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(width, height)
            .request_timeout(self.settings.page_load_timeout)
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={}", self.settings.user_agent));
        if self.settings.disable_images {
            builder = builder.arg("--blink-settings=imagesEnabled=false");
        }
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|err| SessionError::new(SessionFailureKind::Launch, err))
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn acquire(&self) -> Result<Box<dyn FeedSession>, SessionError> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| SessionError::new(SessionFailureKind::Launch, err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    engine_debug!("browser handler stopped: {err}");
                    break;
                }
            }
        });

        let page = match prepare_page(&browser).await {
            Ok(page) => page,
            Err(err) => {
                let session = ChromeSession {
                    browser,
                    page: None,
                    handler_task,
                    settings: self.settings.clone(),
                };
                if let Err(close_err) = Box::new(session).release().await {
                    engine_warn!("closing the half-initialised browser failed: {close_err}");
                }
                return Err(err);
            }
        };

        Ok(Box::new(ChromeSession {
            browser,
            page: Some(page),
            handler_task,
            settings: self.settings.clone(),
        }))
    }
}

async fn prepare_page(browser: &Browser) -> Result<Page, SessionError> {
    let page = browser.new_page("about:blank").await.map_err(browser_error)?;
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(MASK_WEBDRIVER))
        .await
        .map_err(browser_error)?;
    Ok(page)
}

fn browser_error(err: impl std::fmt::Display) -> SessionError {
    SessionError::new(SessionFailureKind::Browser, err.to_string())
}

pub struct ChromeSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    settings: SessionSettings,
}

impl ChromeSession {
    fn page(&self) -> Result<&Page, SessionError> {
        self.page
            .as_ref()
            .ok_or_else(|| SessionError::new(SessionFailureKind::Browser, "no open page"))
    }

    async fn evaluate_number(&self, expression: &str) -> Result<f64, SessionError> {
        self.page()?
            .evaluate(expression)
            .await
            .map_err(browser_error)?
            .into_value::<f64>()
            .map_err(browser_error)
    }

    async fn wait_for_first_item(&self, cancel: &CancellationToken) -> Result<(), SessionError> {
        let deadline = tokio::time::Instant::now() + self.settings.element_wait_timeout;
        loop {
            let found = self
                .page()?
                .find_elements(self.settings.item_selector.as_str())
                .await
                .map(|elements| !elements.is_empty())
                .unwrap_or(false);
            if found {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SessionError::new(
                    SessionFailureKind::ElementWaitTimeout,
                    format!(
                        "no {} within {:?}",
                        self.settings.item_selector, self.settings.element_wait_timeout
                    ),
                ));
            }
            let poll = self.settings.element_poll_interval.max(Duration::from_millis(50));
            if !pause(poll, cancel).await {
                return Err(SessionError::new(
                    SessionFailureKind::Cancelled,
                    "while waiting for feed items",
                ));
            }
        }
    }
}

#[async_trait]
impl FeedView for ChromeSession {
    async fn rendered_items(&mut self) -> Result<Vec<ItemSnapshot>, SessionError> {
        let selector = serde_json::to_string(&self.settings.item_selector).map_err(browser_error)?;
        let script =
            format!("Array.from(document.querySelectorAll({selector})).map(el => el.outerHTML)");
        let markup: Vec<String> = self
            .page()?
            .evaluate(script)
            .await
            .map_err(browser_error)?
            .into_value()
            .map_err(browser_error)?;
        Ok(markup.into_iter().map(ItemSnapshot::new).collect())
    }

    async fn viewport_height(&mut self) -> Result<f64, SessionError> {
        self.evaluate_number("window.innerHeight").await
    }

    async fn scroll_offset(&mut self) -> Result<f64, SessionError> {
        self.evaluate_number("window.pageYOffset").await
    }

    async fn scroll_to(&mut self, offset: f64) -> Result<(), SessionError> {
        self.page()?
            .evaluate(format!("window.scrollTo(0, {offset:.0})"))
            .await
            .map_err(browser_error)?;
        Ok(())
    }
}

#[async_trait]
impl FeedSession for ChromeSession {
    async fn open_feed(&mut self, cancel: &CancellationToken) -> Result<(), SessionError> {
        let url = self.settings.feed_url.clone();
        let timeout = self.settings.page_load_timeout;
        engine_info!("opening {url}");
        let navigation = async {
            self.page()?.goto(url.as_str()).await.map_err(browser_error)?;
            Ok::<(), SessionError>(())
        };
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(SessionError::new(SessionFailureKind::Cancelled, "during navigation"));
            }
            result = tokio::time::timeout(timeout, navigation) => match result {
                Ok(outcome) => outcome?,
                Err(_) => {
                    return Err(SessionError::new(
                        SessionFailureKind::NavigationTimeout,
                        format!("{url} did not load within {timeout:?}"),
                    ));
                }
            },
        }
        self.wait_for_first_item(cancel).await
    }

    async fn release(mut self: Box<Self>) -> Result<(), SessionError> {
        if let Some(page) = self.page.take() {
            if let Err(err) = page.close().await {
                engine_debug!("closing the feed page failed: {err}");
            }
        }
        let closed = self.browser.close().await.map(|_| ()).map_err(browser_error);
        if let Err(err) = self.browser.wait().await {
            engine_debug!("waiting for the browser process failed: {err}");
        }
        self.handler_task.abort();
        closed
    }
}
