//! Headless page rendering.
//!
//! - [`session`] - engine-neutral traits for sessions and page contexts
//! - [`provider`] - lazy shared session with relaunch on disconnect
//! - [`chromium`] - Chromium implementation over the DevTools protocol
//! - [`render`] - the render operation and the limited [`Renderer`]

pub mod chromium;
pub mod provider;
pub mod render;
pub mod session;

pub use chromium::{ChromiumLauncher, ChromiumProvider};
pub use provider::{LazyProvider, Launcher, ManagedSession};
pub use render::{render_page, RenderOptions, Renderer};
pub use session::{BrowserSession, PageContext, PageError, SessionProvider};
