//! Chromium backend over the DevTools protocol (chromiumoxide).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::page::{EventDomContentEventFired, NavigateParams};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::provider::{LazyProvider, Launcher, ManagedSession};
use super::session::{BrowserSession, PageContext, PageError};
use crate::config::{BrowserSettings, DEFAULT_BROWSER_ARGS};
use crate::{ProxyError, Result};

/// Chromium shared by every render, started on first use and relaunched if
/// the DevTools connection drops.
pub type ChromiumProvider = LazyProvider<ChromiumLauncher>;

pub struct ChromiumLauncher {
    settings: BrowserSettings,
}

impl ChromiumLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self) -> Result<ChromiumSession> {
        ChromiumSession::launch(&self.settings).await
    }
}

pub struct ChromiumSession {
    browser: RwLock<Browser>,
    handler: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
}

impl ChromiumSession {
    async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let config = browser_config(settings)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ProxyError::browser(format!("failed to launch chromium: {e}")))?;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = connected.clone();
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "browser handler event error");
                }
            }
            flag.store(false, Ordering::SeqCst);
            info!("chromium connection closed");
        });

        info!(headless = settings.headless, "chromium session started");
        Ok(Self {
            browser: RwLock::new(browser),
            handler: Mutex::new(Some(handler)),
            connected,
        })
    }
}

#[async_trait]
impl ManagedSession for ChromiumSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        let mut browser = self.browser.write().await;
        if let Err(err) = browser.close().await {
            warn!(error = %err, "failed to close chromium cleanly");
        }
        if let Err(err) = browser.wait().await {
            warn!(error = %err, "failed to reap chromium process");
        }
        if let Some(handler) = self.handler.lock().await.take() {
            handler.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("chromium session closed");
    }
}

fn browser_config(settings: &BrowserSettings) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder();
    builder = if settings.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(path) = &settings.executable {
        builder = builder.chrome_executable(path);
    }
    let args: Vec<String> = DEFAULT_BROWSER_ARGS
        .iter()
        .map(|arg| arg.to_string())
        .chain(settings.extra_args.iter().cloned())
        .collect();
    builder
        .args(args)
        .build()
        .map_err(|e| ProxyError::browser(format!("failed to configure chromium: {e}")))
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_page(&self) -> std::result::Result<Box<dyn PageContext>, PageError> {
        let page = {
            let browser = self.browser.read().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| PageError::new(format!("failed to create page: {e}")))?
        };
        let listener = match spawn_request_logger(&page).await {
            Ok(listener) => listener,
            Err(err) => {
                if let Err(close_err) = page.close().await {
                    debug!(error = %close_err, "failed to close half-initialized page");
                }
                return Err(err);
            }
        };
        Ok(Box::new(ChromiumPage { page, listener }))
    }
}

struct ChromiumPage {
    page: Page,
    listener: JoinHandle<()>,
}

#[async_trait]
impl PageContext for ChromiumPage {
    async fn set_user_agent(&mut self, user_agent: &str) -> std::result::Result<(), PageError> {
        self.page
            .execute(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map_err(|e| PageError::new(format!("failed to set user agent: {e}")))?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> std::result::Result<(), PageError> {
        let mut dom_ready = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(|e| PageError::new(format!("failed to subscribe to DOMContentLoaded: {e}")))?;

        let response = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| PageError::new(e.to_string()))?;
        if let Some(error_text) = response.result.error_text.as_deref() {
            return Err(PageError::new(error_text));
        }

        dom_ready
            .next()
            .await
            .map(|_| ())
            .ok_or_else(|| PageError::new("page closed before DOMContentLoaded"))
    }

    async fn content(&mut self) -> std::result::Result<String, PageError> {
        self.page
            .content()
            .await
            .map_err(|e| PageError::new(format!("failed to read document: {e}")))
    }

    async fn close(self: Box<Self>) -> std::result::Result<(), PageError> {
        let ChromiumPage { page, listener } = *self;
        listener.abort();
        page.close()
            .await
            .map_err(|e| PageError::new(format!("failed to close page: {e}")))
    }
}

/// Logs failed sub-resource requests for one page. Aborts the page triggers itself
/// (cancelled prefetches, favicon races) are noise, everything else is a warning;
/// neither fails the render.
async fn spawn_request_logger(page: &Page) -> std::result::Result<JoinHandle<()>, PageError> {
    let subscribe_err = |e: chromiumoxide::error::CdpError| {
        PageError::new(format!("failed to subscribe to network events: {e}"))
    };
    let mut sent = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(subscribe_err)?;
    let mut finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(subscribe_err)?;
    let mut failed = page
        .event_listener::<EventLoadingFailed>()
        .await
        .map_err(subscribe_err)?;

    Ok(tokio::spawn(async move {
        let mut in_flight: HashMap<String, String> = HashMap::new();
        loop {
            tokio::select! {
                Some(event) = sent.next() => {
                    in_flight.insert(event.request_id.inner().clone(), event.request.url.clone());
                }
                Some(event) = finished.next() => {
                    in_flight.remove(event.request_id.inner());
                }
                Some(event) = failed.next() => {
                    let url = in_flight
                        .remove(event.request_id.inner())
                        .unwrap_or_default();
                    if is_benign_abort(&event.error_text, event.canceled) {
                        warn!(url = %url, "ignored abort");
                    } else {
                        warn!(url = %url, error = %event.error_text, "request failed");
                    }
                }
                else => break,
            }
        }
    }))
}

/// True for failures caused by the page cancelling its own request.
pub(crate) fn is_benign_abort(error_text: &str, canceled: Option<bool>) -> bool {
    canceled.unwrap_or(false) || error_text.contains("net::ERR_ABORTED")
}
