use std::net::IpAddr;
use std::time::Duration;

use render_proxy_lib::config::{parse_target, split_browser_args};
use render_proxy_lib::{Config, ProxyError, Result};

use crate::cli::Cli;

/// Effective configuration: config file first, then values from the command
/// line or its environment fallbacks.
pub fn resolve(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    apply_cli(&mut config, cli)?;
    config.validate()?;
    Ok(config)
}

fn apply_cli(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(target) = &cli.target {
        config.target = parse_target(target)?;
    }
    if let Some(host) = &cli.host {
        let ip: IpAddr = host
            .trim()
            .parse()
            .map_err(|_| ProxyError::config(format!("HOST '{host}' is not an IP address")))?;
        config.listen.set_ip(ip);
    }
    if let Some(port) = cli.port {
        config.listen.set_port(port);
    }
    if let Some(n) = cli.max_render_concurrency {
        config.max_render_concurrency = n;
    }
    if let Some(ms) = cli.render_timeout_ms {
        config.render_timeout = Duration::from_millis(ms);
    }
    if let Some(path) = &cli.render_path {
        config.routes.render = path.clone();
    }
    if let Some(path) = &cli.proxy_path {
        config.routes.proxy = path.clone();
    }
    if let Some(path) = &cli.health_path {
        config.routes.health = path.clone();
    }
    if let Some(headless) = cli.headless {
        config.browser.headless = headless;
    }
    if let Some(args) = &cli.browser_args {
        config.browser.extra_args = split_browser_args(args);
    }
    if let Some(path) = &cli.chrome_executable {
        config.browser.executable = Some(path.clone());
    }
    if let Some(ua) = &cli.user_agent {
        config.browser.user_agent = ua.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use render_proxy_lib::config::LogFormat;
    use std::io::Write;

    #[test]
    fn cli_values_override_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            r#"
target = "https://file.example"
port = 4000
max_render_concurrency = 2

[logging]
format = "json"
"#
        )
        .expect("write config");

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            port: Some(5000),
            render_timeout_ms: Some(1500),
            browser_args: Some("--lang=de".to_string()),
            ..Cli::default()
        };
        let config = resolve(&cli).expect("resolve");

        assert_eq!(config.target.as_str(), "https://file.example/");
        assert_eq!(config.listen.port(), 5000);
        assert_eq!(config.max_render_concurrency, 2);
        assert_eq!(config.render_timeout, Duration::from_millis(1500));
        assert_eq!(config.browser.extra_args, vec!["--lang=de".to_string()]);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let config = resolve(&Cli::default()).expect("resolve");
        assert_eq!(config.listen.port(), 3000);
        assert_eq!(config.max_render_concurrency, 3);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cli = Cli {
            max_render_concurrency: Some(0),
            ..Cli::default()
        };
        assert!(resolve(&cli).is_err());

        let cli = Cli {
            host: Some("my-laptop".to_string()),
            ..Cli::default()
        };
        assert!(matches!(resolve(&cli), Err(ProxyError::Config(_))));

        let cli = Cli {
            target: Some("ftp://example.com".to_string()),
            ..Cli::default()
        };
        assert!(resolve(&cli).is_err());
    }
}
