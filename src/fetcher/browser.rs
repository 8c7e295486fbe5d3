//! Headless Chrome session shared by all category workers of a cycle

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{absolute_url, category_page_url};
use crate::config::FetcherConfig;
use crate::error::{FetchInitError, NavigationError};
use crate::traits::PageFetcher;

struct Session {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
}

/// [`PageFetcher`] backed by a headless Chrome instance.
///
/// Every fetch opens its own tab and closes it afterwards, so concurrent
/// fetches never share page state. Only the browser handle is shared.
pub struct BrowserFetcher {
    config: FetcherConfig,
    session: Mutex<Option<Session>>,
}

impl BrowserFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    async fn browser(&self) -> Result<Arc<Browser>, NavigationError> {
        let guard = self.session.lock().await;
        guard
            .as_ref()
            .map(|session| Arc::clone(&session.browser))
            .ok_or(NavigationError::NotStarted)
    }

    async fn render(&self, cancel: &CancellationToken, url: &str) -> Result<String, NavigationError> {
        if cancel.is_cancelled() {
            return Err(NavigationError::Cancelled { url: url.to_string() });
        }

        let browser = self.browser().await?;
        let page = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(NavigationError::Cancelled { url: url.to_string() }),
            page = self.open_tab(&browser, url) => page?,
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(NavigationError::Cancelled { url: url.to_string() }),
            html = self.load(&page, url) => html,
        };

        if let Err(e) = page.close().await {
            debug!(url, error = %e, "failed to close tab");
        }

        result
    }

    async fn open_tab(&self, browser: &Browser, url: &str) -> Result<Page, NavigationError> {
        let timeout = self.config.page_timeout;
        tokio::time::timeout(timeout, browser.new_page("about:blank"))
            .await
            .map_err(|_| NavigationError::Timeout {
                url: url.to_string(),
                timeout,
            })?
            .map_err(|e| browser_error(url, e))
    }

    async fn load(&self, page: &Page, url: &str) -> Result<String, NavigationError> {
        let timeout = self.config.page_timeout;
        let timed_out = || NavigationError::Timeout {
            url: url.to_string(),
            timeout,
        };

        tokio::time::timeout(timeout, async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<(), CdpError>(())
        })
        .await
        .map_err(|_| timed_out())?
        .map_err(|e| browser_error(url, e))?;

        tokio::time::sleep(self.config.settle_delay).await;

        tokio::time::timeout(timeout, page.content())
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| browser_error(url, e))
    }
}

fn browser_error(url: &str, error: impl std::fmt::Display) -> NavigationError {
    NavigationError::Browser {
        url: url.to_string(),
        reason: error.to_string(),
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn start(&self) -> Result<(), FetchInitError> {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let browser_config = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={}", self.config.user_agent))
            .build()
            .map_err(|reason| FetchInitError { reason })?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| FetchInitError {
                reason: e.to_string(),
            })?;

        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        *guard = Some(Session {
            browser: Arc::new(browser),
            handler,
        });

        info!("browser started");
        Ok(())
    }

    async fn stop(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        match Arc::try_unwrap(session.browser) {
            Ok(mut browser) => {
                if let Err(e) = browser.close().await {
                    warn!(error = %e, "browser close error");
                }
                if let Err(e) = browser.wait().await {
                    warn!(error = %e, "browser process wait error");
                }
            }
            Err(_) => warn!("browser still referenced by a fetch, dropping handle"),
        }

        session.handler.abort();
        info!("browser closed");
    }

    async fn fetch_main_page(&self, cancel: &CancellationToken) -> Result<String, NavigationError> {
        let url = absolute_url(&self.config.base_url, "/");
        info!(url, "fetching main page");

        let html = self.render(cancel, &url).await?;
        info!(html_length = html.len(), "main page fetched");
        Ok(html)
    }

    async fn fetch_category_page(
        &self,
        cancel: &CancellationToken,
        path: &str,
        page: u32,
    ) -> Result<String, NavigationError> {
        let url = category_page_url(&self.config.base_url, path, page);
        info!(url, page, "fetching category page");

        let html = self.render(cancel, &url).await?;
        debug!(url, html_length = html.len(), "category page fetched");
        Ok(html)
    }
}
