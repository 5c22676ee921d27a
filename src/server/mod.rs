//! HTTP surface: one dispatcher in front of the render, proxy and health branches.

mod middleware;
pub mod routes;

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::browser::Renderer;
use crate::config::{Config, RoutePaths};
use crate::links::RewriteContext;
use crate::proxy::AssetProxy;
use crate::rewrite::rewrite_html;
use crate::Result;

pub use middleware::log_responses;
pub use routes::{classify, Route};

const RENDER_FAILURE: &str = "Rendering error";

#[derive(Clone)]
pub struct AppState {
    renderer: Renderer,
    proxy: AssetProxy,
    ctx: Arc<RewriteContext>,
    routes: Arc<RoutePaths>,
}

impl AppState {
    pub fn new(config: &Config, renderer: Renderer) -> Result<Self> {
        let ctx = Arc::new(RewriteContext::from_config(config));
        let proxy = AssetProxy::new(Arc::clone(&ctx), &config.proxy)?;
        Ok(Self {
            renderer,
            proxy,
            ctx,
            routes: Arc::new(config.routes.clone()),
        })
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(axum::middleware::from_fn(log_responses))
        .with_state(state)
}

async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let route = classify(
        request.method(),
        request.uri().path(),
        request.uri().query(),
        &state.routes,
    );
    debug!(?route, "routed request");

    match route {
        Route::Health => Json(json!({ "ok": true })).into_response(),
        Route::Proxy => state.proxy.forward(request).await,
        Route::MethodNotAllowed => {
            (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response()
        }
        Route::Root => {
            let target = state.ctx.origin().to_string();
            render_and_rewrite(&state, target).await
        }
        Route::ExplicitRender { url } => match parse_explicit(&url) {
            Some(target) => render_and_rewrite(&state, target.to_string()).await,
            None => {
                warn!(url, "rejected render url");
                (StatusCode::BAD_REQUEST, "Invalid url param").into_response()
            }
        },
        Route::RenderFallback { path_and_query } | Route::CatchAll { path_and_query } => {
            let target = state.ctx.implicit_target(&path_and_query);
            render_and_rewrite(&state, target).await
        }
    }
}

/// Explicit render targets must be absolute http(s) URLs.
fn parse_explicit(raw: &str) -> Option<Url> {
    Url::parse(raw.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

async fn render_and_rewrite(state: &AppState, target: String) -> Response {
    let html = match state.renderer.render(&target).await {
        Ok(html) => html,
        Err(err) => {
            error!(url = %target, kind = err.kind(), error = %err, "render failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, RENDER_FAILURE).into_response();
        }
    };

    match rewrite_html(&html, &state.ctx) {
        Ok(outcome) => {
            debug!(
                url = %target,
                rewritten = outcome.rewritten,
                unresolved = outcome.unresolved,
                "rewrote rendered page"
            );
            Html(outcome.html).into_response()
        }
        Err(err) => {
            error!(url = %target, error = %err, "rewrite failed");
            (StatusCode::INTERNAL_SERVER_ERROR, RENDER_FAILURE).into_response()
        }
    }
}

/// Serves `router` until `shutdown` resolves, then lets in-flight requests drain.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "render proxy listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
