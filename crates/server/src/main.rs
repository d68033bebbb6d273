use rust_uptime_monitor::alerts::DesktopNotifier;
use rust_uptime_monitor::api::start_webserver;
use rust_uptime_monitor::config::load_config;
use rust_uptime_monitor::probe::NetworkProber;
use rust_uptime_monitor::service::MonitorService;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "rust_uptime_monitor=info,hyper=warn,lettre=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(
            name = "main.shutdown_signal.failed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            error = %e,
            message = "Failed to listen for ctrl-c"
        );
    }
    tracing::info!(
        name = "main.shutdown_signal.received",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        message = "Shutdown signal received"
    );
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    initialize_standard_tracing();

    let config = load_config()?;

    let service = Arc::new(MonitorService::new(
        &config,
        Arc::new(NetworkProber),
        Arc::new(DesktopNotifier),
    ));
    service.start().await;

    let served = start_webserver(Arc::clone(&service), &config.api, shutdown_signal()).await;

    service.shutdown().await;
    served
}
