#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use render_proxy_lib::browser::{
    BrowserSession, PageContext, PageError, RenderOptions, Renderer, SessionProvider,
};
use render_proxy_lib::limiter::RenderLimiter;
use render_proxy_lib::RenderError;

/// Counters shared by a fake browser and all of its pages.
#[derive(Default)]
pub struct Stats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub open_now: AtomicUsize,
    pub peak_open: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
}

impl Stats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn open_now(&self) -> usize {
        self.open_now.load(Ordering::SeqCst)
    }

    pub fn peak_open(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }
}

/// In-memory browser: navigation sleeps for `delay`, then the page reports a
/// small document that mentions the URL it was loaded from.
pub struct FakeBrowser {
    pub stats: Arc<Stats>,
    delay: Duration,
    fail_navigation: Option<String>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(Stats::default()),
            delay: Duration::ZERO,
            fail_navigation: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_navigation = Some(message.to_string());
        self
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn PageContext>, PageError> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.stats.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_open.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            stats: Arc::clone(&self.stats),
            delay: self.delay,
            fail_navigation: self.fail_navigation.clone(),
            url: None,
        }))
    }
}

struct FakePage {
    stats: Arc<Stats>,
    delay: Duration,
    fail_navigation: Option<String>,
    url: Option<String>,
}

#[async_trait]
impl PageContext for FakePage {
    async fn set_user_agent(&mut self, _user_agent: &str) -> Result<(), PageError> {
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), PageError> {
        self.stats.navigations.lock().unwrap().push(url.to_string());
        tokio::time::sleep(self.delay).await;
        if let Some(message) = &self.fail_navigation {
            return Err(PageError::new(message.clone()));
        }
        self.url = Some(url.to_string());
        Ok(())
    }

    async fn content(&mut self) -> Result<String, PageError> {
        let url = self.url.clone().unwrap_or_default();
        Ok(format!(
            "<html><head><link rel=\"stylesheet\" href=\"/site.css\"></head>\
             <body><p id=\"loaded\">{url}</p><a href=\"/about\">About</a></body></html>"
        ))
    }

    async fn close(self: Box<Self>) -> Result<(), PageError> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        self.stats.open_now.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one shared [`FakeBrowser`], or fails the first `failures` starts.
pub struct FakeProvider {
    browser: Arc<FakeBrowser>,
    failures: AtomicUsize,
    pub attempts: AtomicUsize,
    pub shut_down: AtomicBool,
}

impl FakeProvider {
    pub fn new(browser: FakeBrowser) -> Self {
        Self {
            browser: Arc::new(browser),
            failures: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn failing_starts(self, failures: usize) -> Self {
        self.failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.browser.stats)
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn acquire(&self) -> Result<Arc<dyn BrowserSession>, RenderError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RenderError::session("browser failed to launch"));
        }
        Ok(Arc::clone(&self.browser) as Arc<dyn BrowserSession>)
    }

    async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

pub fn renderer(provider: Arc<FakeProvider>, max_concurrency: usize, timeout: Duration) -> Renderer {
    Renderer::new(
        provider,
        RenderLimiter::new(max_concurrency),
        RenderOptions {
            timeout,
            ..RenderOptions::default()
        },
    )
}
