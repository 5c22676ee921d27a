//! Render Proxy Library
//!
//! Serves one target site through headless Chromium: pages are rendered, their
//! links, forms and asset references are rewritten to come back through this
//! server, and assets are forwarded to the origin verbatim.
//!
//! # Module Overview
//!
//! - [`browser`] - Browser session provider and the render operation
//! - [`limiter`] - FIFO admission limiter for renders
//! - [`links`] - URL translation between the origin and proxy routes
//! - [`rewrite`] - HTML rewriting of rendered pages
//! - [`proxy`] - Asset pass-through
//! - [`server`] - Routing and the HTTP server
//! - [`config`] - Configuration defaults and file support
//! - [`telemetry`] - Tracing subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use render_proxy_lib::browser::{ChromiumLauncher, ChromiumProvider, RenderOptions, Renderer};
//! use render_proxy_lib::limiter::RenderLimiter;
//! use render_proxy_lib::Config;
//!
//! # async fn example() -> render_proxy_lib::Result<()> {
//! let config = Config::load(None)?;
//! let launcher = ChromiumLauncher::new(config.browser.clone());
//! let provider = Arc::new(ChromiumProvider::new(launcher));
//! let renderer = Renderer::new(
//!     provider,
//!     RenderLimiter::new(config.max_render_concurrency),
//!     RenderOptions::from(&config),
//! );
//! let html = renderer.render("https://example.com/").await?;
//! # let _ = html;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod error;
pub mod limiter;
pub mod links;
pub mod proxy;
pub mod rewrite;
pub mod server;
pub mod telemetry;

pub use config::Config;
pub use error::{ProxyError, RenderError, Result};
pub use links::RewriteContext;
