//! The render operation: one page context, one navigation, one HTML snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::session::{BrowserSession, PageContext, SessionProvider};
use crate::config::{Config, DEFAULT_RENDER_TIMEOUT, DEFAULT_USER_AGENT};
use crate::error::RenderError;
use crate::limiter::RenderLimiter;

/// Per-render settings.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Upper bound on navigation up to DOMContentLoaded.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RENDER_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl From<&Config> for RenderOptions {
    fn from(config: &Config) -> Self {
        Self {
            timeout: config.render_timeout,
            user_agent: config.browser.user_agent.clone(),
        }
    }
}

/// Renders `url` in a fresh page context and returns the parsed document's HTML.
///
/// The page context is closed before returning on every path, including timeout.
pub async fn render_page(
    session: &dyn BrowserSession,
    url: &str,
    options: &RenderOptions,
) -> Result<String, RenderError> {
    let mut page = session
        .new_page()
        .await
        .map_err(|e| RenderError::page(url, e.to_string()))?;

    let outcome = drive(page.as_mut(), url, options).await;

    if let Err(err) = page.close().await {
        warn!(url, error = %err, "failed to close page context");
    }
    outcome
}

async fn drive(
    page: &mut dyn PageContext,
    url: &str,
    options: &RenderOptions,
) -> Result<String, RenderError> {
    page.set_user_agent(&options.user_agent)
        .await
        .map_err(|e| RenderError::page(url, e.to_string()))?;

    match timeout(options.timeout, page.navigate(url)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(RenderError::navigation(url, err.to_string())),
        Err(_) => {
            return Err(RenderError::Timeout {
                url: url.to_string(),
                timeout: options.timeout,
            })
        }
    }

    page.content()
        .await
        .map_err(|e| RenderError::page(url, e.to_string()))
}

/// Render entry point used by the HTTP layer: session provider, admission
/// limiter and render options bundled together.
#[derive(Clone)]
pub struct Renderer {
    provider: Arc<dyn SessionProvider>,
    limiter: RenderLimiter,
    options: Arc<RenderOptions>,
}

impl Renderer {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        limiter: RenderLimiter,
        options: RenderOptions,
    ) -> Self {
        Self {
            provider,
            limiter,
            options: Arc::new(options),
        }
    }

    pub fn limiter(&self) -> &RenderLimiter {
        &self.limiter
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Queues a render of `url` behind the limiter and waits for its result.
    ///
    /// The render runs on its own task: if the caller goes away mid-render the
    /// operation still finishes and closes its page context.
    pub async fn render(&self, url: &str) -> Result<String, RenderError> {
        let this = self.clone();
        let target = url.to_string();
        debug!(
            url,
            active = self.limiter.active(),
            queued = self.limiter.queued(),
            "render submitted"
        );

        let handle = tokio::spawn(async move {
            this.limiter
                .submit(async {
                    let started = Instant::now();
                    let session = this.provider.acquire().await?;
                    let html = render_page(session.as_ref(), &target, &this.options).await?;
                    info!(
                        url = %target,
                        bytes = html.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "page rendered"
                    );
                    Ok::<_, RenderError>(html)
                })
                .await
        });

        match handle.await {
            Ok(Ok(result)) => result,
            Ok(Err(_closed)) => Err(RenderError::Aborted {
                url: url.to_string(),
                message: "renderer is shutting down".to_string(),
            }),
            Err(join) => Err(RenderError::Aborted {
                url: url.to_string(),
                message: join.to_string(),
            }),
        }
    }

    /// Stops admitting renders and closes the shared browser session.
    pub async fn shutdown(&self) {
        self.limiter.close();
        self.provider.shutdown().await;
    }
}
