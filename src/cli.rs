use clap::Parser;
use render_proxy_lib::config::LogFormat;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "render-proxy")]
#[command(
    version,
    about = "Headless-browser rendering proxy",
    long_about = "Render Proxy\n\nServes pages of one target site after rendering them in headless Chromium.\nLinks, forms and asset references in the rendered HTML are rewritten so browsing stays on this server; assets are forwarded to the target verbatim.\n\nEvery flag can also be set through the environment variable shown; flags win over the environment, which wins over the config file."
)]
pub struct Cli {
    #[arg(
        long,
        env = "RENDER_PROXY_CONFIG",
        value_name = "PATH",
        help = "Optional config file (TOML); environment and flags override it"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, env = "TARGET", help = "Target origin URL all pages are resolved against")]
    pub target: Option<String>,

    #[arg(long, env = "HOST", help = "Listen address (IP)")]
    pub host: Option<String>,

    #[arg(long, env = "PORT", help = "Listen port")]
    pub port: Option<u16>,

    #[arg(
        long,
        env = "MAX_RENDER_CONCURRENCY",
        help = "Renders allowed to run at once; the rest queue in arrival order"
    )]
    pub max_render_concurrency: Option<usize>,

    #[arg(
        long = "render-timeout-ms",
        env = "RENDER_TIMEOUT_MS",
        value_name = "MS",
        help = "Navigation timeout per render in milliseconds"
    )]
    pub render_timeout_ms: Option<u64>,

    #[arg(long, env = "RENDER_PATH", help = "Explicit render route")]
    pub render_path: Option<String>,

    #[arg(long, env = "PROXY_PATH", help = "Asset proxy route prefix")]
    pub proxy_path: Option<String>,

    #[arg(long, env = "HEALTH_PATH", help = "Liveness route")]
    pub health_path: Option<String>,

    #[arg(
        long,
        env = "HEADLESS",
        value_name = "BOOL",
        help = "Run Chromium headless (true/false)"
    )]
    pub headless: Option<bool>,

    #[arg(
        long,
        env = "BROWSER_ARGS",
        value_name = "ARGS",
        allow_hyphen_values = true,
        help = "Extra Chromium flags, comma-separated"
    )]
    pub browser_args: Option<String>,

    #[arg(long, env = "CHROME_EXECUTABLE", value_name = "PATH", help = "Chromium binary to launch")]
    pub chrome_executable: Option<PathBuf>,

    #[arg(long, env = "USER_AGENT", help = "User agent presented by rendered pages")]
    pub user_agent: Option<String>,

    #[arg(long, env = "LOG_FORMAT", help = "Log output format (compact or json)")]
    pub log_format: Option<LogFormat>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;
    use render_proxy_lib::config::LogFormat;

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "render-proxy",
            "--target",
            "https://example.com",
            "--port",
            "8080",
            "--max-render-concurrency",
            "5",
            "--render-timeout-ms",
            "1000",
            "--headless",
            "false",
            "--browser-args",
            "--lang=en-US,--mute-audio",
            "--log-format",
            "json",
        ])
        .expect("parse");

        assert_eq!(cli.target.as_deref(), Some("https://example.com"));
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.max_render_concurrency, Some(5));
        assert_eq!(cli.render_timeout_ms, Some(1000));
        assert_eq!(cli.headless, Some(false));
        assert_eq!(cli.browser_args.as_deref(), Some("--lang=en-US,--mute-audio"));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn rejects_bad_port() {
        assert!(Cli::try_parse_from(["render-proxy", "--port", "99999"]).is_err());
    }
}
