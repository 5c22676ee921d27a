//! Lazy, shared browser session with relaunch on disconnect.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use super::session::{BrowserSession, SessionProvider};
use crate::error::RenderError;
use crate::Result;

/// Starts a browser engine. Called at most once at a time by [`LazyProvider`].
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    type Session: ManagedSession;

    async fn launch(&self) -> Result<Self::Session>;
}

/// A session the provider can health-check and tear down.
#[async_trait]
pub trait ManagedSession: BrowserSession + 'static {
    /// False once the connection to the engine is gone for good.
    fn is_connected(&self) -> bool;

    async fn close(&self);
}

/// Starts the session on first use and shares it until it disconnects.
///
/// The slot lock is held across a launch, so concurrent first callers wait for
/// the same start instead of racing to spawn their own. A failed launch leaves
/// the slot empty and the next caller tries again.
pub struct LazyProvider<L: Launcher> {
    launcher: L,
    session: Mutex<Option<Arc<L::Session>>>,
}

impl<L: Launcher> LazyProvider<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            session: Mutex::new(None),
        }
    }

    pub async fn is_started(&self) -> bool {
        self.session.lock().await.is_some()
    }
}

#[async_trait]
impl<L: Launcher> SessionProvider for LazyProvider<L> {
    async fn acquire(&self) -> std::result::Result<Arc<dyn BrowserSession>, RenderError> {
        let mut slot = self.session.lock().await;

        if let Some(session) = slot.as_ref() {
            if session.is_connected() {
                return Ok(session.clone() as Arc<dyn BrowserSession>);
            }
            warn!("browser session disconnected; relaunching");
            if let Some(stale) = slot.take() {
                stale.close().await;
            }
        }

        match self.launcher.launch().await {
            Ok(session) => {
                let session = Arc::new(session);
                *slot = Some(session.clone());
                Ok(session as Arc<dyn BrowserSession>)
            }
            Err(err) => {
                warn!(error = %err, "browser session failed to start; next request will retry");
                Err(RenderError::session(err.to_string()))
            }
        }
    }

    async fn shutdown(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::session::{PageContext, PageError};
    use crate::ProxyError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeSession {
        connected: AtomicBool,
        closed: AtomicBool,
    }

    impl FakeSession {
        fn new() -> Self {
            Self {
                connected: AtomicBool::new(true),
                closed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn new_page(&self) -> std::result::Result<Box<dyn PageContext>, PageError> {
            Err(PageError::new("no pages in this session"))
        }
    }

    #[async_trait]
    impl ManagedSession for FakeSession {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Slow launcher that counts starts and fails the first `failures` of them.
    struct CountingLauncher {
        launches: AtomicUsize,
        failures: AtomicUsize,
    }

    impl CountingLauncher {
        fn failing(failures: usize) -> Self {
            Self {
                launches: AtomicUsize::new(0),
                failures: AtomicUsize::new(failures),
            }
        }
    }

    #[async_trait]
    impl Launcher for CountingLauncher {
        type Session = FakeSession;

        async fn launch(&self) -> Result<FakeSession> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(ProxyError::browser("failed to launch chromium"));
            }
            Ok(FakeSession::new())
        }
    }

    fn launches(provider: &LazyProvider<CountingLauncher>) -> usize {
        provider.launcher.launches.load(Ordering::SeqCst)
    }

    async fn current(provider: &LazyProvider<CountingLauncher>) -> Arc<FakeSession> {
        provider.session.lock().await.clone().expect("session started")
    }

    #[tokio::test]
    async fn concurrent_first_acquires_share_one_launch() {
        let provider = LazyProvider::new(CountingLauncher::failing(0));

        let sessions = futures::future::join_all((0..8).map(|_| provider.acquire())).await;
        let sessions: Vec<_> = sessions
            .into_iter()
            .map(|s| s.expect("session"))
            .collect();

        assert_eq!(launches(&provider), 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    }

    #[tokio::test]
    async fn failed_launch_is_retried_by_next_caller() {
        let provider = LazyProvider::new(CountingLauncher::failing(1));

        let err = provider.acquire().await.err().expect("first launch fails");
        assert!(err.to_string().contains("failed to launch chromium"), "{err}");
        assert!(!provider.is_started().await);

        provider.acquire().await.expect("second launch succeeds");
        assert_eq!(launches(&provider), 2);
        assert!(provider.is_started().await);
    }

    #[tokio::test]
    async fn disconnected_session_is_replaced() {
        let provider = LazyProvider::new(CountingLauncher::failing(0));
        let first = provider.acquire().await.expect("session");
        let stale = current(&provider).await;

        stale.connected.store(false, Ordering::SeqCst);
        let second = provider.acquire().await.expect("relaunched session");

        assert_eq!(launches(&provider), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(stale.closed.load(Ordering::SeqCst));
        assert!(current(&provider).await.is_connected());
    }

    #[tokio::test]
    async fn live_session_is_reused() {
        let provider = LazyProvider::new(CountingLauncher::failing(0));
        let first = provider.acquire().await.expect("session");
        let second = provider.acquire().await.expect("session");

        assert_eq!(launches(&provider), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn shutdown_closes_and_forgets_the_session() {
        let provider = LazyProvider::new(CountingLauncher::failing(0));
        assert!(!provider.is_started().await);

        provider.acquire().await.expect("session");
        let session = current(&provider).await;
        provider.shutdown().await;

        assert!(session.closed.load(Ordering::SeqCst));
        assert!(!provider.is_started().await);
    }

    #[tokio::test]
    async fn shutdown_before_start_does_not_launch() {
        let provider = LazyProvider::new(CountingLauncher::failing(0));
        provider.shutdown().await;
        assert_eq!(launches(&provider), 0);
    }
}
