//! URL translation between the target origin and the proxy's own routes.
//!
//! Every reference found in rendered markup, and every `Location` header coming
//! back from the origin, is resolved against the single configured origin and then
//! re-expressed as a path on this server:
//!
//! - navigations become `{render}?url=<percent-encoded absolute URL>`
//! - asset references become `{proxy}<path><query><fragment>`
//! - form actions become the bare origin path
//!
//! Resolution failures yield `None`; callers keep the original value in that case.

use url::Url;

use crate::config::{Config, RoutePaths};

/// Fixed routing context shared by the rewriter, the asset proxy and the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteContext {
    origin: Url,
    render_path: String,
    proxy_prefix: String,
}

impl RewriteContext {
    pub fn new(origin: Url, routes: &RoutePaths) -> Self {
        Self {
            origin,
            render_path: routes.render.clone(),
            proxy_prefix: routes.proxy.clone(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.target.clone(), &config.routes)
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn render_path(&self) -> &str {
        &self.render_path
    }

    pub fn proxy_prefix(&self) -> &str {
        &self.proxy_prefix
    }

    /// Resolves `reference` (relative or absolute) against the origin.
    pub fn resolve(&self, reference: &str) -> Option<Url> {
        self.origin.join(reference.trim()).ok()
    }

    /// Render-route path for an already absolute URL.
    pub fn render_path_for(&self, url: &Url) -> String {
        format!(
            "{}?url={}",
            self.render_path,
            urlencoding::encode(url.as_str())
        )
    }

    /// Navigation reference → render-route path.
    pub fn to_render_path(&self, reference: &str) -> Option<String> {
        self.resolve(reference).map(|url| self.render_path_for(&url))
    }

    /// Asset reference → proxy path. Non-network schemes (`data:`, `blob:`,
    /// `javascript:`) have no origin path to forward and are left alone.
    pub fn to_proxy_path(&self, reference: &str) -> Option<String> {
        let url = self.resolve(reference)?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let mut path = format!("{}{}", self.proxy_prefix, url.path());
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        if let Some(fragment) = url.fragment() {
            path.push('#');
            path.push_str(fragment);
        }
        Some(path)
    }

    /// Form action → origin path only, so the submission lands back on this server.
    pub fn to_form_action(&self, action: &str) -> Option<String> {
        let action = if action.trim().is_empty() { "/" } else { action };
        self.resolve(action).map(|url| url.path().to_string())
    }

    /// Redirect target from the origin → render-route path.
    pub fn rewrite_location(&self, location: &str) -> Option<String> {
        self.to_render_path(location)
    }

    /// Recovers the absolute URL carried by a render-route path, e.g.
    /// `/render?url=https%3A%2F%2Fexample.com%2Fabout`.
    pub fn origin_url_from_render_path(&self, render_path: &str) -> Option<Url> {
        let (path, query) = render_path.split_once('?')?;
        if path != self.render_path {
            return None;
        }
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "url")
            .and_then(|(_, value)| Url::parse(&value).ok())
    }

    /// Absolute origin URL for a catch-all request: origin (trailing slash trimmed)
    /// followed by the request's path and query, verbatim.
    pub fn implicit_target(&self, path_and_query: &str) -> String {
        let base = self.origin.as_str().trim_end_matches('/');
        if path_and_query.starts_with('/') {
            format!("{base}{path_and_query}")
        } else {
            format!("{base}/{path_and_query}")
        }
    }

    /// Strips the proxy prefix from a request path. `None` when the path is not
    /// under the prefix (`/proxyfoo` is not under `/proxy`).
    pub fn strip_proxy_prefix<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.proxy_prefix.as_str())?;
        if rest.is_empty() {
            Some("/")
        } else if rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Origin URL a proxied request is forwarded to.
    pub fn upstream_url(&self, stripped_path: &str, query: Option<&str>) -> Url {
        let mut url = self.origin.clone();
        url.set_path(stripped_path);
        url.set_query(query.filter(|q| !q.is_empty()));
        url.set_fragment(None);
        url
    }
}
