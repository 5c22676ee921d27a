use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::{ProxyError, Result};

pub const DEFAULT_TARGET: &str = "https://www.google.com";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_RENDER_CONCURRENCY: usize = 3;
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_millis(45_000);
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Client identity presented to the target site by every rendered page.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/122 Safari/537.36";

/// Launch flags applied to every Chromium process.
pub const DEFAULT_BROWSER_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub target: Url,
    pub listen: SocketAddr,
    pub max_render_concurrency: usize,
    pub render_timeout: Duration,
    pub routes: RoutePaths,
    pub browser: BrowserSettings,
    pub proxy: ProxySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePaths {
    pub render: String,
    pub proxy: String,
    pub health: String,
}

impl Default for RoutePaths {
    fn default() -> Self {
        Self {
            render: "/render".to_string(),
            proxy: "/proxy".to_string(),
            health: "/health".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Explicit Chromium binary; chromiumoxide searches the usual locations when unset.
    pub executable: Option<PathBuf>,
    /// Appended after [`DEFAULT_BROWSER_ARGS`].
    pub extra_args: Vec<String>,
    pub user_agent: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            extra_args: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub upstream_timeout: Duration,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!(
                "unknown log format '{other}' (expected compact or json)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSettings {
    pub format: LogFormat,
}

impl Config {
    /// Built-in defaults for everything but the target origin.
    pub fn new(target: Url) -> Self {
        Self {
            target,
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            max_render_concurrency: DEFAULT_MAX_RENDER_CONCURRENCY,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            routes: RoutePaths::default(),
            browser: BrowserSettings::default(),
            proxy: ProxySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// On-disk TOML shape. Every key is optional; missing keys keep the built-in default.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub target: Option<String>,
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub max_render_concurrency: Option<usize>,
    #[serde(with = "humantime_serde")]
    pub render_timeout: Option<Duration>,
    pub routes: FileRoutes,
    pub browser: FileBrowser,
    pub proxy: FileProxy,
    pub logging: FileLogging,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileRoutes {
    pub render: Option<String>,
    pub proxy: Option<String>,
    pub health: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileBrowser {
    pub headless: Option<bool>,
    pub executable: Option<PathBuf>,
    pub extra_args: Option<Vec<String>>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileProxy {
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileLogging {
    pub format: Option<LogFormat>,
}

impl Config {
    /// Defaults, overlaid with the TOML file at `path` when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = Config::new(parse_target(DEFAULT_TARGET)?);
        if let Some(path) = path {
            let raw = fs::read_to_string(path)?;
            let file: FileConfig = toml::from_str(&raw).map_err(|e| {
                ProxyError::config(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            cfg.apply_file(file)?;
        }
        Ok(cfg)
    }

    pub fn apply_file(&mut self, file: FileConfig) -> Result<()> {
        if let Some(target) = file.target {
            self.target = parse_target(&target)?;
        }
        if let Some(host) = file.host {
            self.listen.set_ip(host);
        }
        if let Some(port) = file.port {
            self.listen.set_port(port);
        }
        if let Some(n) = file.max_render_concurrency {
            self.max_render_concurrency = n;
        }
        if let Some(timeout) = file.render_timeout {
            self.render_timeout = timeout;
        }
        if let Some(path) = file.routes.render {
            self.routes.render = path;
        }
        if let Some(path) = file.routes.proxy {
            self.routes.proxy = path;
        }
        if let Some(path) = file.routes.health {
            self.routes.health = path;
        }
        if let Some(headless) = file.browser.headless {
            self.browser.headless = headless;
        }
        if let Some(executable) = file.browser.executable {
            self.browser.executable = Some(executable);
        }
        if let Some(args) = file.browser.extra_args {
            self.browser.extra_args = args;
        }
        if let Some(ua) = file.browser.user_agent {
            self.browser.user_agent = ua;
        }
        if let Some(timeout) = file.proxy.upstream_timeout {
            self.proxy.upstream_timeout = timeout;
        }
        if let Some(format) = file.logging.format {
            self.logging.format = format;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_render_concurrency == 0 {
            return Err(ProxyError::config(
                "max render concurrency must be at least 1",
            ));
        }
        if self.render_timeout.is_zero() {
            return Err(ProxyError::config("render timeout must be greater than zero"));
        }
        if self.proxy.upstream_timeout.is_zero() {
            return Err(ProxyError::config(
                "upstream timeout must be greater than zero",
            ));
        }
        check_target(&self.target)?;

        let routes = [
            ("render", &self.routes.render),
            ("proxy", &self.routes.proxy),
            ("health", &self.routes.health),
        ];
        for (name, path) in routes {
            if !path.starts_with('/') || path.len() < 2 || path.ends_with('/') {
                return Err(ProxyError::config(format!(
                    "{name} path '{path}' must start with '/', not end with '/', and not be the root"
                )));
            }
        }
        let r = &self.routes;
        if r.render == r.proxy || r.render == r.health || r.proxy == r.health {
            return Err(ProxyError::config(format!(
                "route paths must be distinct (render '{}', proxy '{}', health '{}')",
                r.render, r.proxy, r.health
            )));
        }
        Ok(())
    }

    /// One-line summary for the startup log.
    pub fn summary(&self) -> String {
        format!(
            "target={}, listen={}, max_render_concurrency={}, render_timeout={}ms, routes: render={} proxy={} health={}, headless={}",
            self.target,
            self.listen,
            self.max_render_concurrency,
            self.render_timeout.as_millis(),
            self.routes.render,
            self.routes.proxy,
            self.routes.health,
            self.browser.headless,
        )
    }
}

/// Parses and checks a target origin URL.
pub fn parse_target(value: &str) -> Result<Url> {
    let url = Url::parse(value.trim())?;
    check_target(&url)?;
    Ok(url)
}

fn check_target(url: &Url) -> Result<()> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxyError::config(format!(
            "target '{url}' must use http or https"
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ProxyError::config(format!("target '{url}' has no host")));
    }
    Ok(())
}

/// Splits a comma-separated flag list, dropping blanks.
pub fn split_browser_args(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
