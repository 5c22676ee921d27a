//! Request classification.
//!
//! Routes are matched in a fixed order rather than by registration order:
//! health, then the proxy prefix, then the explicit render path, then the root,
//! and finally the catch-all render.

use axum::http::Method;
use url::form_urlencoded;

use crate::config::RoutePaths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Health,
    /// Anything under the proxy prefix, any method.
    Proxy,
    /// Render path with a non-empty `url` parameter.
    ExplicitRender { url: String },
    /// Render path without a `url` parameter; rebuilt from path and remaining query.
    RenderFallback { path_and_query: String },
    Root,
    CatchAll { path_and_query: String },
    MethodNotAllowed,
}

pub fn classify(method: &Method, path: &str, query: Option<&str>, routes: &RoutePaths) -> Route {
    let read_only = *method == Method::GET || *method == Method::HEAD;
    if read_only && path == routes.health {
        return Route::Health;
    }
    if is_under(path, &routes.proxy) {
        return Route::Proxy;
    }
    if !read_only {
        return Route::MethodNotAllowed;
    }
    if path == routes.render {
        return match explicit_url(query) {
            Some(url) => Route::ExplicitRender { url },
            None => Route::RenderFallback {
                path_and_query: with_query(path, remaining_query(query).as_deref()),
            },
        };
    }
    if path == "/" {
        return Route::Root;
    }
    Route::CatchAll {
        path_and_query: with_query(path, query),
    }
}

fn is_under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// First non-empty `url` parameter; an empty one counts as absent.
fn explicit_url(query: Option<&str>) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, value)| key == "url" && !value.trim().is_empty())
        .map(|(_, value)| value.into_owned())
}

/// Query string with every `url` parameter removed.
fn remaining_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if key != "url" {
            serializer.append_pair(&key, &value);
            any = true;
        }
    }
    any.then(|| serializer.finish())
}

fn with_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path.to_string(),
    }
}
