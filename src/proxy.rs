//! Pass-through forwarding of asset requests to the target origin.

use std::io;
use std::sync::Arc;

use axum::body::{Body, HttpBody};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, warn};

use crate::config::ProxySettings;
use crate::links::RewriteContext;
use crate::Result;

/// Headers that describe a single transport hop and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone)]
pub struct AssetProxy {
    client: reqwest::Client,
    ctx: Arc<RewriteContext>,
}

impl AssetProxy {
    pub fn new(ctx: Arc<RewriteContext>, settings: &ProxySettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(settings.upstream_timeout)
            .build()?;
        Ok(Self { client, ctx })
    }

    pub fn context(&self) -> &RewriteContext {
        &self.ctx
    }

    /// Forwards `request` to the origin with the proxy prefix removed.
    ///
    /// Method, headers and body pass through unchanged apart from hop-by-hop
    /// headers and `Host`. A `Location` header on the way back is pointed at the
    /// render route.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();

        let Some(stripped) = self.ctx.strip_proxy_prefix(parts.uri.path()) else {
            return (StatusCode::NOT_FOUND, "Not found").into_response();
        };
        let upstream = self.ctx.upstream_url(stripped, parts.uri.query());

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        debug!(method = %parts.method, url = %upstream, "forwarding asset request");
        let mut outbound = self
            .client
            .request(parts.method.clone(), upstream.clone())
            .headers(headers);
        if body.size_hint().exact() != Some(0) {
            outbound = outbound.body(stream_body(body));
        }
        let sent = outbound.send().await;

        let upstream_response = match sent {
            Ok(response) => response,
            Err(err) => {
                error!(method = %parts.method, url = %upstream, error = %err, "upstream request failed");
                return (StatusCode::BAD_GATEWAY, "Upstream error").into_response();
            }
        };

        let status = upstream_response.status();
        let mut headers = upstream_response.headers().clone();
        strip_hop_by_hop(&mut headers);
        self.rewrite_location(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    fn rewrite_location(&self, headers: &mut HeaderMap) {
        let Some(location) = headers
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
        else {
            return;
        };
        let Some(rewritten) = self.ctx.rewrite_location(location) else {
            debug!(location, "redirect target left as is");
            return;
        };
        match HeaderValue::from_str(&rewritten) {
            Ok(value) => {
                headers.insert(header::LOCATION, value);
            }
            Err(err) => warn!(location = %rewritten, error = %err, "invalid rewritten location"),
        }
    }
}

/// Streams an inbound body to the origin chunk by chunk. The pump task bridges
/// axum's `!Sync` body into a channel receiver reqwest can own.
fn stream_body(body: Body) -> reqwest::Body {
    let (mut tx, rx) = mpsc::channel::<std::result::Result<Bytes, io::Error>>(8);
    tokio::spawn(async move {
        let mut chunks = body.into_data_stream();
        while let Some(chunk) = chunks.next().await {
            let failed = chunk.is_err();
            if tx.send(chunk.map_err(io::Error::other)).await.is_err() || failed {
                break;
            }
        }
    });
    reqwest::Body::wrap_stream(rx)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by `Connection` are hop-by-hop as well.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}
