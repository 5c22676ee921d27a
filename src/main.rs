mod cli;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;

use render_proxy_lib::browser::{
    ChromiumLauncher, ChromiumProvider, RenderOptions, Renderer, SessionProvider,
};
use render_proxy_lib::limiter::RenderLimiter;
use render_proxy_lib::server::{build_router, serve, shutdown_signal, AppState};
use render_proxy_lib::{telemetry, Config, ProxyError};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; variables may come from the real environment.
    let _ = dotenvy::dotenv();

    let args = cli::parse();
    let config = match settings::resolve(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::from(2);
        }
    };

    if let Err(err) = telemetry::init(&config.logging) {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "render proxy stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), ProxyError> {
    info!(config = %config.summary(), "loaded configuration");

    let provider: Arc<dyn SessionProvider> = Arc::new(ChromiumProvider::new(
        ChromiumLauncher::new(config.browser.clone()),
    ));
    let limiter = RenderLimiter::new(config.max_render_concurrency);
    let renderer = Renderer::new(provider, limiter, RenderOptions::from(&config));

    let state = AppState::new(&config, renderer.clone())?;
    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|err| ProxyError::Server(format!("failed to bind {}: {err}", config.listen)))?;

    let served = serve(listener, build_router(state), shutdown_signal()).await;

    info!("shutting down browser session");
    renderer.shutdown().await;
    served
}
