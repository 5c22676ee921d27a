//! Seams between the render operation and the browser engine.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::RenderError;

/// Engine-level failure text; the render operation attaches the URL.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct PageError(pub String);

impl PageError {
    pub fn new(message: impl Into<String>) -> Self {
        PageError(message.into())
    }
}

/// One isolated page, exclusively owned by a single render operation.
#[async_trait]
pub trait PageContext: Send {
    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), PageError>;

    /// Navigates and resolves once the document has been parsed (DOMContentLoaded),
    /// without waiting for every sub-resource.
    async fn navigate(&mut self, url: &str) -> Result<(), PageError>;

    /// Serialized HTML of the current document.
    async fn content(&mut self) -> Result<String, PageError>;

    async fn close(self: Box<Self>) -> Result<(), PageError>;
}

/// A running browser process that hands out fresh page contexts.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageContext>, PageError>;
}

/// Lazily starts and then shares one browser session.
///
/// `acquire` is safe to call concurrently before the first start completes: all
/// callers observe the same session, and a failed start is retried by the next call.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn BrowserSession>, RenderError>;

    async fn shutdown(&self);
}
